use std::time::Duration;

/// Tuning knobs for an [`Engine`](crate::Engine), installed through the
/// protocol builder and shared by every peer of a session.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// How long a buffered field change may sit unsent before it is flushed
    /// as a single command carrying the latest value.
    pub debounce_window: Duration,
    /// Ticks added by the sequencer to the current tick when stamping a
    /// command, so it reaches every peer before it is due.
    pub command_lead_ticks: u32,
    /// Allows handlers flagged `debug_only` to emit commands.
    pub debug_mode: bool,
    /// Upper bound on a command payload accepted from the wire.
    pub max_payload_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(200),
            command_lead_ticks: 4,
            debug_mode: false,
            max_payload_len: 1 << 20,
        }
    }
}
