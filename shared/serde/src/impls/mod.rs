pub mod blob;
mod option;
mod scalars;
pub mod sequence;
mod string;
mod tuple;
