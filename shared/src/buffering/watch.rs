use crate::{types::SyncId, value::Value};

/// What `observe` saw of a field slot, handed back to `commit` once the UI
/// has had its chance to edit it.
#[derive(Debug)]
pub struct WatchToken {
    pub(crate) sync_id: SyncId,
    pub(crate) target: Value,
    pub(crate) index: Value,
    pub(crate) before: Value,
}

impl WatchToken {
    pub fn sync_id(&self) -> SyncId {
        self.sync_id
    }

    /// The value the slot held when it was observed.
    pub fn before(&self) -> &Value {
        &self.before
    }
}

#[derive(Debug)]
enum WatchFrame {
    Marker,
    Token(WatchToken),
}

/// Nested `watch_begin` / `watch_end` scopes.
#[derive(Debug, Default)]
pub(crate) struct WatchStack {
    frames: Vec<WatchFrame>,
}

impl WatchStack {
    pub fn begin(&mut self) {
        self.frames.push(WatchFrame::Marker);
    }

    pub fn push(&mut self, token: WatchToken) {
        self.frames.push(WatchFrame::Token(token));
    }

    /// Pops the innermost scope. Returns its tokens in observation order, or
    /// `None` when no scope is open.
    pub fn end(&mut self) -> Option<Vec<WatchToken>> {
        let marker = self
            .frames
            .iter()
            .rposition(|frame| matches!(frame, WatchFrame::Marker))?;
        let tokens = self
            .frames
            .drain(marker..)
            .filter_map(|frame| match frame {
                WatchFrame::Token(token) => Some(token),
                WatchFrame::Marker => None,
            })
            .collect();
        Some(tokens)
    }

    pub fn is_open(&self) -> bool {
        self.frames
            .iter()
            .any(|frame| matches!(frame, WatchFrame::Marker))
    }
}
