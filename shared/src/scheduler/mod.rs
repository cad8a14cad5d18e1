pub mod command_scheduler;
pub mod tick_sequencer;
