use std::collections::{BTreeMap, HashSet, VecDeque};

use log::{debug, warn};

use crate::{
    command::ScheduledCommand,
    types::{MapId, Tick},
};

#[derive(Default)]
struct MapQueue {
    by_tick: BTreeMap<Tick, VecDeque<ScheduledCommand>>,
    executed_through: Option<Tick>,
}

impl MapQueue {
    fn len(&self) -> usize {
        self.by_tick.values().map(VecDeque::len).sum()
    }
}

/// Holds sequenced commands until their tick comes up.
///
/// Commands may arrive in any order. Per map they are released in tick
/// order, and in arrival order within a tick.
#[derive(Default)]
pub struct CommandScheduler {
    maps: BTreeMap<MapId, MapQueue>,
    removed: HashSet<MapId>,
    next_seq: u64,
}

impl CommandScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files a command under its map and tick. Returns `false` when the
    /// command was dropped because its map has been removed.
    pub fn push(&mut self, mut command: ScheduledCommand) -> bool {
        if self.removed.contains(&command.map) {
            debug!(
                "Dropping command for removed map {:?} at tick {}",
                command.map, command.tick
            );
            return false;
        }

        command.seq = self.next_seq;
        self.next_seq += 1;

        let queue = self.maps.entry(command.map).or_default();
        if let Some(executed) = queue.executed_through {
            if command.tick <= executed {
                warn!(
                    "Command for map {:?} arrived for tick {} after tick {} executed, running it at the next step",
                    command.map, command.tick, executed
                );
            }
        }
        queue
            .by_tick
            .entry(command.tick)
            .or_default()
            .push_back(command);
        true
    }

    /// Takes the next command of `map` due at or before `tick`.
    pub fn pop_ready(&mut self, map: MapId, tick: Tick) -> Option<ScheduledCommand> {
        let queue = self.maps.get_mut(&map)?;
        let mut entry = queue.by_tick.first_entry()?;
        if *entry.key() > tick {
            return None;
        }
        let command = entry.get_mut().pop_front();
        if entry.get().is_empty() {
            entry.remove();
        }
        command
    }

    /// Whether `map` has executed at least one tick.
    pub fn has_run(&self, map: MapId) -> bool {
        self.maps
            .get(&map)
            .is_some_and(|queue| queue.executed_through.is_some())
    }

    pub fn mark_executed(&mut self, map: MapId, tick: Tick) {
        let queue = self.maps.entry(map).or_default();
        queue.executed_through = Some(queue.executed_through.map_or(tick, |t| t.max(tick)));
    }

    /// Forgets a map: its pending commands are dropped, and so is anything
    /// that arrives for it later.
    pub fn remove_map(&mut self, map: MapId) -> usize {
        self.removed.insert(map);
        let dropped = self.maps.remove(&map).map_or(0, |queue| queue.len());
        if dropped > 0 {
            debug!("Dropped {} pending commands of removed map {:?}", dropped, map);
        }
        dropped
    }

    pub fn is_removed(&self, map: MapId) -> bool {
        self.removed.contains(&map)
    }

    pub fn pending(&self, map: MapId) -> usize {
        self.maps.get(&map).map_or(0, MapQueue::len)
    }

    pub fn total_pending(&self) -> usize {
        self.maps.values().map(MapQueue::len).sum()
    }

    /// Maps with at least one pending command, in map order.
    pub fn maps(&self) -> impl Iterator<Item = MapId> + '_ {
        self.maps
            .iter()
            .filter(|(_, queue)| !queue.by_tick.is_empty())
            .map(|(map, _)| *map)
    }
}
