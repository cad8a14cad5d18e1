pub mod context;
pub mod defs;
pub mod error;
pub mod references;
pub mod registry;
pub mod sync_type;
pub mod type_key;
pub mod worker;
