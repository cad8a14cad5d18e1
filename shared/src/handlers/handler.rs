use std::{any::Any, ops::BitOr};

use lockstep_serde::{read_sequence_len, write_sequence_len, ByteReader};

use crate::{
    handlers::error::HandlerError,
    serialization::{
        context::{ReadContext, WriteContext},
        error::SerializationError,
        references::ObjectGraph,
        registry::TypeRegistry,
    },
    types::{CellPos, MapId, ObjectId, SyncId, Tick},
};

/// Ambient UI state a handler may ask to carry alongside its command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SyncContext(u8);

impl SyncContext {
    pub const NONE: SyncContext = SyncContext(0);
    /// Partition the command on the map the local player is looking at.
    pub const CURRENT_MAP: SyncContext = SyncContext(1);
    /// Carry the cell under the mouse.
    pub const MOUSE_CELL: SyncContext = SyncContext(1 << 1);
    /// Carry the selected objects.
    pub const SELECTED: SyncContext = SyncContext(1 << 2);
    /// Carry whether the order was queued (shift held) instead of replacing.
    pub const QUEUE_ORDER: SyncContext = SyncContext(1 << 3);

    pub fn contains(&self, other: SyncContext) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

impl BitOr for SyncContext {
    type Output = SyncContext;

    fn bitor(self, rhs: SyncContext) -> SyncContext {
        SyncContext(self.0 | rhs.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Field,
    Method,
    Delegate,
    Choice,
}

/// Result of replaying a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handled {
    Applied,
    /// The handler refused the command without touching the world, e.g.
    /// because an argument no longer resolves on this peer.
    Declined,
}

/// Identity and gating shared by every handler kind.
#[derive(Clone, Debug)]
pub struct HandlerMeta {
    pub sync_id: SyncId,
    pub name: String,
    pub version: i32,
    pub context: SyncContext,
    pub debug_only: bool,
    pub host_only: bool,
}

impl HandlerMeta {
    pub fn new(name: &str) -> Self {
        Self {
            sync_id: -1,
            name: name.to_string(),
            version: 0,
            context: SyncContext::NONE,
            debug_only: false,
            host_only: false,
        }
    }
}

/// Builder options common to all handler kinds.
pub trait HandlerOptions: Sized {
    fn options_mut(&mut self) -> &mut HandlerMeta;

    /// Handlers are ordered by version, then registration order, when the
    /// protocol locks.
    fn version(mut self, version: i32) -> Self {
        self.options_mut().version = version;
        self
    }

    fn context(mut self, context: SyncContext) -> Self {
        let meta = self.options_mut();
        meta.context = meta.context | context;
        self
    }

    fn debug_only(mut self) -> Self {
        self.options_mut().debug_only = true;
        self
    }

    fn host_only(mut self) -> Self {
        self.options_mut().host_only = true;
        self
    }
}

/// UI state of the local player, read when a command is emitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UiState {
    pub current_map: MapId,
    pub mouse_cell: Option<CellPos>,
    pub selected: Vec<ObjectId>,
    pub queue_order: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            current_map: MapId::GLOBAL,
            mouse_cell: None,
            selected: Vec::new(),
            queue_order: false,
        }
    }
}

/// Context of one command being replayed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub map: MapId,
    pub tick: Tick,
    pub mouse_cell: Option<CellPos>,
    pub selected: Vec<ObjectId>,
    pub queue_order: bool,
}

impl Invocation {
    pub fn new(map: MapId, tick: Tick) -> Self {
        Self {
            map,
            tick,
            mouse_cell: None,
            selected: Vec::new(),
            queue_order: false,
        }
    }
}

/// One replayable operation registered in the protocol.
pub trait SyncHandler<W>: Any {
    fn meta(&self) -> &HandlerMeta;

    fn meta_mut(&mut self) -> &mut HandlerMeta;

    fn kind(&self) -> HandlerKind;

    /// Decodes the handler's part of a command and applies it to the world.
    fn handle(
        &self,
        world: &mut W,
        reader: &mut ByteReader,
        registry: &TypeRegistry<W>,
        invocation: &Invocation,
    ) -> Result<Handled, HandlerError>;

    fn as_any(&self) -> &dyn Any;
}

pub(crate) fn write_ambient<W: ObjectGraph + 'static>(
    ctx: &mut WriteContext<'_, W>,
    context: SyncContext,
    ui: &UiState,
) -> Result<(), SerializationError> {
    if context.contains(SyncContext::MOUSE_CELL) {
        CellPos::ser_optional(ui.mouse_cell.as_ref(), ctx.writer())?;
    }
    if context.contains(SyncContext::SELECTED) {
        // selection is only meaningful on the command's own map
        let world = ctx.world();
        let map = ctx.map();
        let selected: Vec<ObjectId> = ui
            .selected
            .iter()
            .copied()
            .filter(|id| world.map_of(*id) == Some(map))
            .collect();
        write_sequence_len(ctx.writer(), selected.len())?;
        for id in selected {
            ctx.write_object(Some(id))?;
        }
    }
    if context.contains(SyncContext::QUEUE_ORDER) {
        ctx.write(&ui.queue_order)?;
    }
    Ok(())
}

pub(crate) fn read_ambient<W: ObjectGraph + 'static>(
    ctx: &mut ReadContext<'_, '_, W>,
    context: SyncContext,
    invocation: &mut Invocation,
) -> Result<(), SerializationError> {
    if context.contains(SyncContext::MOUSE_CELL) {
        invocation.mouse_cell = CellPos::de_optional(ctx.reader())?;
    }
    if context.contains(SyncContext::SELECTED) {
        let count = read_sequence_len(ctx.reader())?;
        for _ in 0..count {
            if let Some(id) = ctx.read_object()? {
                invocation.selected.push(id);
            }
        }
    }
    if context.contains(SyncContext::QUEUE_ORDER) {
        invocation.queue_order = ctx.read()?;
    }
    Ok(())
}

/// Picks the map a command is partitioned on. Every anchor object must live
/// on the same map; without anchors the command goes to the current map when
/// the handler carries map-bound context, and to the global partition
/// otherwise.
pub(crate) fn resolve_map<W: ObjectGraph>(
    world: &W,
    context: SyncContext,
    ui: &UiState,
    anchors: impl IntoIterator<Item = ObjectId>,
) -> Result<MapId, SerializationError> {
    let mut resolved: Option<(ObjectId, MapId)> = None;
    for id in anchors {
        let Some(map) = world.map_of(id) else {
            return Err(SerializationError::UnresolvableContainer { id });
        };
        match resolved {
            None => resolved = Some((id, map)),
            Some((_, expected)) if expected != map => {
                return Err(SerializationError::PartitionMismatch {
                    id,
                    expected,
                    found: map,
                });
            }
            Some(_) => {}
        }
    }
    if let Some((_, map)) = resolved {
        return Ok(map);
    }

    let map_bound = SyncContext::CURRENT_MAP | SyncContext::MOUSE_CELL | SyncContext::SELECTED;
    if context.0 & map_bound.0 != 0 {
        Ok(ui.current_map)
    } else {
        Ok(MapId::GLOBAL)
    }
}
