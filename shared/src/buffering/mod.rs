pub mod change_buffer;
pub mod watch;
