use std::collections::HashMap;

use crate::{
    command::{CommandEnvelope, ScheduledCommand},
    types::{MapId, Tick},
};

/// The single authority that decides when commands run.
///
/// Runs on the host. Every envelope, including the host's own, goes through
/// it before being broadcast, so all peers see the same tick for it.
pub struct TickSequencer {
    lead_ticks: u32,
    last_stamped: HashMap<MapId, Tick>,
}

impl TickSequencer {
    pub fn new(lead_ticks: u32) -> Self {
        Self {
            lead_ticks,
            last_stamped: HashMap::new(),
        }
    }

    /// Next tick for a command on `map`: `lead_ticks` ahead of the current
    /// tick, and never before the last command stamped for the same map.
    pub fn next_tick(&mut self, map: MapId, current_tick: Tick) -> Tick {
        let earliest = current_tick.saturating_add(self.lead_ticks);
        let tick = match self.last_stamped.get(&map) {
            Some(last) => earliest.max(*last),
            None => earliest,
        };
        self.last_stamped.insert(map, tick);
        tick
    }

    pub fn stamp(&mut self, envelope: CommandEnvelope, current_tick: Tick) -> ScheduledCommand {
        let tick = self.next_tick(envelope.map, current_tick);
        ScheduledCommand::new(envelope, tick)
    }

    pub fn forget_map(&mut self, map: MapId) {
        self.last_stamped.remove(&map);
    }
}
