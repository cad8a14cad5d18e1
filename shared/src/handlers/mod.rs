pub mod args;
pub mod choice;
pub mod delegate;
pub mod error;
pub mod field;
pub mod handler;
pub mod handler_list;
pub mod member;
pub mod method;
