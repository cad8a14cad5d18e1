use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use crate::{
    handlers::field::FieldOps,
    types::SyncId,
    value::{Value, ValueRef},
};

/// Local state of one buffered field slot between a UI edit and the command
/// that replicates it.
#[derive(Debug)]
pub struct BufferData {
    /// The value every peer agrees on, last seen in the simulation.
    pub actual_value: Value,
    /// The value the local player wants.
    pub to_send: Value,
    /// Start of the current debounce window.
    pub timestamp: Instant,
    pub sent: bool,
}

#[derive(Debug)]
pub(crate) struct BufferEntry {
    pub target: Value,
    pub index: Value,
    pub data: BufferData,
}

/// An entry whose debounce window ran out, ready to be sent.
pub(crate) struct DueChange {
    pub sync_id: SyncId,
    pub target: Value,
    pub index: Value,
    pub value: Value,
}

/// The target and index of one field slot.
#[derive(Clone, Copy, Default)]
pub struct Slot<'a> {
    pub target: ValueRef<'a>,
    pub index: ValueRef<'a>,
}

impl<'a> Slot<'a> {
    pub fn new(target: ValueRef<'a>, index: ValueRef<'a>) -> Self {
        Self { target, index }
    }
}

/// Pending buffered field edits, keyed by (handler, target, index).
#[derive(Default)]
pub struct ChangeBuffer {
    entries: BTreeMap<SyncId, Vec<BufferEntry>>,
}

impl ChangeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    pub fn get(&self, sync_id: SyncId, ops: &FieldOps, slot: Slot) -> Option<&BufferData> {
        self.entries
            .get(&sync_id)?
            .iter()
            .find(|entry| entry.matches(ops, slot))
            .map(|entry| &entry.data)
    }

    /// Records the value a UI edit left in the field. Returns the value the
    /// field must be restored to until the change is applied everywhere, and
    /// whether the edit changed what is pending.
    ///
    /// `current` is the value the field held before the edit. It becomes the
    /// entry's actual value when no entry exists yet.
    pub(crate) fn record(
        &mut self,
        sync_id: SyncId,
        ops: &FieldOps,
        slot: Slot,
        current: ValueRef,
        edited: ValueRef,
        now: Instant,
    ) -> (Value, bool) {
        let entries = self.entries.entry(sync_id).or_default();
        if let Some(entry) = entries
            .iter_mut()
            .find(|entry| entry.matches(ops, slot))
        {
            let data = &mut entry.data;
            let changed = !ops.value.eq(data.to_send.as_ref(), edited);
            if changed {
                data.to_send = ops.value.clone_value(edited);
                if data.sent {
                    data.sent = false;
                    data.timestamp = now;
                }
            }
            return (ops.value.clone_value(data.actual_value.as_ref()), changed);
        }

        let changed = !ops.value.eq(current, edited);
        if changed {
            entries.push(BufferEntry {
                target: ops.target.clone_value(slot.target),
                index: ops.index.clone_value(slot.index),
                data: BufferData {
                    actual_value: ops.value.clone_value(current),
                    to_send: ops.value.clone_value(edited),
                    timestamp: now,
                    sent: false,
                },
            });
        }
        (ops.value.clone_value(current), changed)
    }

    /// Reconciles every entry of one handler with the live simulation and
    /// collects those whose debounce window has run out.
    ///
    /// `live` reads the current value of a slot, `None` when the target is
    /// gone, which discards the entry.
    pub(crate) fn settle(
        &mut self,
        sync_id: SyncId,
        ops: &FieldOps,
        now: Instant,
        window: Duration,
        live: impl Fn(ValueRef, ValueRef) -> Option<Value>,
        due: &mut Vec<DueChange>,
    ) {
        let Some(entries) = self.entries.get_mut(&sync_id) else {
            return;
        };
        entries.retain_mut(|entry| {
            let Some(live_value) = live(entry.target.as_ref(), entry.index.as_ref()) else {
                return false;
            };
            let data = &mut entry.data;
            if !ops.value.eq(live_value.as_ref(), data.actual_value.as_ref()) {
                data.actual_value = live_value;
                // a sent value overridden by another command goes out again
                if data.sent {
                    data.sent = false;
                    data.timestamp = now;
                }
            }
            if ops.value.eq(data.actual_value.as_ref(), data.to_send.as_ref()) {
                return false;
            }
            if !data.sent && now.saturating_duration_since(data.timestamp) >= window {
                data.sent = true;
                due.push(DueChange {
                    sync_id,
                    target: ops.target.clone_value(entry.target.as_ref()),
                    index: ops.index.clone_value(entry.index.as_ref()),
                    value: ops.value.clone_value(data.to_send.as_ref()),
                });
            }
            true
        });
        if entries.is_empty() {
            self.entries.remove(&sync_id);
        }
    }

    pub(crate) fn sync_ids(&self) -> Vec<SyncId> {
        self.entries.keys().copied().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl BufferEntry {
    fn matches(&self, ops: &FieldOps, slot: Slot) -> bool {
        ops.target.eq(self.target.as_ref(), slot.target)
            && ops.index.eq(self.index.as_ref(), slot.index)
    }
}
