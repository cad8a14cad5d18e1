//! # `engine.rs`: Lockstep Orchestrator
//!
//! The **`Engine<W>`** is the single entry and exit point between the local
//! player's actions, the wire, and the simulation `W`.
//!
//! | Field | Purpose |
//! |-------|---------|
//! | `protocol`  | The locked [`Protocol`]: type registry, handler list, config. |
//! | `outgoing`  | Envelopes produced by local calls; drained via [`Engine::take_outgoing`]. |
//! | `scheduler` | Sequenced commands waiting for their tick, per map. |
//! | `sequencer` | Tick stamping. Only consulted on the host. |
//! | `buffer`    | Debounced edits of buffered fields. |
//! | `watches`   | Open `watch_begin` / `watch_end` scopes. |
//!
//! ## Flow
//! 1. A call site invokes `sync_*` instead of mutating the simulation. The
//!    engine encodes a command and queues an envelope; nothing changes
//!    locally yet.
//! 2. The transport carries envelopes to the host, which stamps each with a
//!    tick through [`Engine::sequence`] and broadcasts the result.
//! 3. Every peer hands the stamped command to [`Engine::receive`] and calls
//!    [`Engine::execute`] once per map and tick. Commands run there, on the
//!    simulation thread, in the same order everywhere.
//!
//! While commands execute, `should_sync` is false: mutations made by a
//! handler are simulation, not player input, and are never re-sent.

use std::time::Instant;

use log::{debug, warn};
use lockstep_serde::{ByteReader, ByteWriter, Serde};

use crate::{
    buffering::{
        change_buffer::{ChangeBuffer, Slot},
        watch::{WatchStack, WatchToken},
    },
    command::{CommandEnvelope, CommandKind, ScheduledCommand},
    config::EngineConfig,
    handlers::{
        error::HandlerError,
        handler::{
            read_ambient, resolve_map, write_ambient, Handled, HandlerMeta, Invocation,
            SyncHandler, UiState,
        },
    },
    protocol::{Protocol, ProtocolError},
    scheduler::{command_scheduler::CommandScheduler, tick_sequencer::TickSequencer},
    serialization::{
        context::{ReadContext, WriteContext},
        error::SerializationError,
        references::ObjectGraph,
        registry::TypeRegistry,
    },
    types::{HostType, MapId, SyncId, Tick},
    value::{Args, Value, ValueRef},
};

/// What one call to [`Engine::execute`] did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Commands whose handler applied them.
    pub executed: usize,
    /// Commands a handler refused, e.g. because their target is gone.
    pub declined: usize,
    /// Commands that failed to decode without desynchronizing the session.
    pub rejected: usize,
    /// Application commands, for the caller to apply in this order.
    pub custom: Vec<ScheduledCommand>,
}

pub struct Engine<W> {
    protocol: Protocol<W>,
    host_type: HostType,
    session_active: bool,
    executing: bool,
    ui: UiState,
    outgoing: Vec<CommandEnvelope>,
    scheduler: CommandScheduler,
    sequencer: TickSequencer,
    buffer: ChangeBuffer,
    watches: WatchStack,
}

impl<W: ObjectGraph + 'static> Engine<W> {
    pub fn new(protocol: Protocol<W>, host_type: HostType) -> Result<Self, ProtocolError> {
        if !protocol.is_locked() {
            return Err(ProtocolError::NotLocked);
        }
        let sequencer = TickSequencer::new(protocol.config.command_lead_ticks);
        Ok(Self {
            protocol,
            host_type,
            session_active: false,
            executing: false,
            ui: UiState::default(),
            outgoing: Vec::new(),
            scheduler: CommandScheduler::new(),
            sequencer,
            buffer: ChangeBuffer::new(),
            watches: WatchStack::default(),
        })
    }

    pub fn host_type(&self) -> HostType {
        self.host_type
    }

    pub fn protocol(&self) -> &Protocol<W> {
        &self.protocol
    }

    pub fn config(&self) -> &EngineConfig {
        &self.protocol.config
    }

    // Session

    pub fn start_session(&mut self) {
        self.session_active = true;
    }

    /// Leaves the session. Pending buffered edits are discarded.
    pub fn end_session(&mut self) {
        self.session_active = false;
        self.buffer.clear();
        self.watches = WatchStack::default();
    }

    pub fn is_session_active(&self) -> bool {
        self.session_active
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    /// Whether local mutations are turned into commands right now.
    pub fn should_sync(&self) -> bool {
        self.session_active && !self.executing
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    pub fn ui_mut(&mut self) -> &mut UiState {
        &mut self.ui
    }

    pub fn change_buffer(&self) -> &ChangeBuffer {
        &self.buffer
    }

    /// Hash of the locked handler list, exchanged with remote peers at
    /// handshake.
    pub fn handler_list_hash(&self) -> u32 {
        self.protocol.handlers.list_hash()
    }

    pub fn verify_remote_handlers(&self, remote: u32) -> Result<(), HandlerError> {
        let local = self.handler_list_hash();
        if local == remote {
            Ok(())
        } else {
            Err(HandlerError::HandlerListMismatch { local, remote })
        }
    }

    fn permits(&self, meta: &HandlerMeta) -> bool {
        if meta.debug_only && !self.protocol.config.debug_mode {
            debug!("{}: debug-only handler outside debug mode, call swallowed", meta.name);
            return false;
        }
        if meta.host_only && self.host_type != HostType::Host {
            debug!("{}: host-only handler called on a client, call swallowed", meta.name);
            return false;
        }
        true
    }

    // Emitting commands

    /// Replicates `target.<field>[index] = value`. Returns `Ok(false)` when
    /// the engine is not syncing and the caller should assign locally.
    pub fn sync_field(
        &mut self,
        world: &W,
        name: &str,
        target: ValueRef,
        value: ValueRef,
        index: ValueRef,
    ) -> Result<bool, HandlerError> {
        let sync_id = self.protocol.handlers.field(name)?.meta().sync_id;
        self.sync_field_by_id(world, sync_id, target, value, index)
    }

    fn sync_field_by_id(
        &mut self,
        world: &W,
        sync_id: SyncId,
        target: ValueRef,
        value: ValueRef,
        index: ValueRef,
    ) -> Result<bool, HandlerError> {
        if !self.should_sync() {
            return Ok(false);
        }
        let field = self.protocol.handlers.field_by_id(sync_id)?;
        let meta = field.meta();
        if !self.permits(meta) {
            return Ok(true);
        }

        let map = resolve_map(world, meta.context, &self.ui, field.anchors(target))?;
        let envelope = encode_command(world, &self.protocol.types, &self.ui, meta, map, |ctx| {
            field.write_body(ctx, target, value, index)
        })?;
        self.outgoing.push(envelope);
        Ok(true)
    }

    /// Replicates a method call. Returns `Ok(false)` when the engine is not
    /// syncing and the caller should invoke the method locally, or when a
    /// cancel guard refused the call.
    pub fn sync_method(
        &mut self,
        world: &W,
        name: &str,
        target: ValueRef,
        args: Args,
    ) -> Result<bool, HandlerError> {
        if !self.should_sync() {
            return Ok(false);
        }
        let method = self.protocol.handlers.method(name)?;
        method.check_args(&args)?;
        let meta = method.meta();
        let now = Instant::now();
        if !self.permits(meta) || method.throttled(now) {
            return Ok(true);
        }
        if !method.admit(&args, &self.ui) {
            return Ok(false);
        }

        let map = resolve_map(world, meta.context, &self.ui, method.anchors(target, &args))?;
        let envelope = encode_command(world, &self.protocol.types, &self.ui, meta, map, |ctx| {
            method.write_body(ctx, target, &args)
        })?;
        method.mark_sent(now);
        self.outgoing.push(envelope);
        Ok(true)
    }

    /// Replicates a UI closure over its captured environment.
    pub fn sync_delegate<E: Default + 'static>(
        &mut self,
        world: &W,
        name: &str,
        env: &E,
        args: Args,
    ) -> Result<bool, HandlerError> {
        if !self.should_sync() {
            return Ok(false);
        }
        let delegate = self.protocol.handlers.delegate::<E>(name)?;
        delegate.check_args(&args)?;
        let meta = delegate.meta();
        if !self.permits(meta) {
            return Ok(true);
        }
        if !delegate.admit(&self.ui) {
            return Ok(false);
        }

        let map = resolve_map(world, meta.context, &self.ui, delegate.anchors(env, &args))?;
        let envelope = encode_command(world, &self.protocol.types, &self.ui, meta, map, |ctx| {
            delegate.write_body(ctx, env, &args)
        })?;
        self.outgoing.push(envelope);
        Ok(true)
    }

    /// Replicates picking `choice` among the options the handler enumerates.
    /// Returns `Ok(false)` when `choice` is not currently offered.
    pub fn sync_choice<C: PartialEq + 'static>(
        &mut self,
        world: &W,
        name: &str,
        target: ValueRef,
        args: Args,
        choice: &C,
    ) -> Result<bool, HandlerError> {
        if !self.should_sync() {
            return Ok(false);
        }
        let handler = self.protocol.handlers.choice::<C>(name)?;
        handler.check_args(&args)?;
        let meta = handler.meta();
        if !self.permits(meta) {
            return Ok(true);
        }
        let Some(index) = handler.index_of(world, target, &args, choice) else {
            debug!("{}: choice is not among the offered options", meta.name);
            return Ok(false);
        };

        let map = resolve_map(world, meta.context, &self.ui, handler.anchors(target, &args))?;
        let envelope = encode_command(world, &self.protocol.types, &self.ui, meta, map, |ctx| {
            handler.write_body(ctx, target, &args, index)
        })?;
        self.outgoing.push(envelope);
        Ok(true)
    }

    /// Queues an application command that is sequenced like any other and
    /// handed back from [`Engine::execute`].
    pub fn queue_custom(&mut self, code: u8, map: MapId, payload: Vec<u8>) -> bool {
        if !self.session_active {
            return false;
        }
        self.outgoing
            .push(CommandEnvelope::new(CommandKind::Custom(code), map, payload));
        true
    }

    /// Drains the envelopes produced since the last call, in call order.
    pub fn take_outgoing(&mut self) -> Vec<CommandEnvelope> {
        std::mem::take(&mut self.outgoing)
    }

    // Sequencing and execution

    /// Stamps an envelope with the tick it runs at. Only the host sequences.
    pub fn sequence(
        &mut self,
        envelope: CommandEnvelope,
        current_tick: Tick,
    ) -> Option<ScheduledCommand> {
        if self.host_type != HostType::Host {
            warn!("Only the host sequences commands, dropping envelope for {:?}", envelope.map);
            return None;
        }
        Some(self.sequencer.stamp(envelope, current_tick))
    }

    /// Files a sequenced command. Returns `false` when its map was removed.
    pub fn receive(&mut self, command: ScheduledCommand) -> bool {
        self.scheduler.push(command)
    }

    /// Decodes a sequenced command straight off the wire, enforcing the
    /// configured payload limit.
    pub fn receive_bytes(&mut self, bytes: &[u8]) -> Result<bool, HandlerError> {
        let mut reader = ByteReader::new(bytes);
        let command = ScheduledCommand::de_limited(&mut reader, self.protocol.config.max_payload_len)?;
        Ok(self.receive(command))
    }

    pub fn pending(&self, map: MapId) -> usize {
        self.scheduler.pending(map)
    }

    /// Runs every command of `map` due at or before `tick`.
    ///
    /// A map that ran before and is gone from `world` is removed. One that
    /// never ran keeps its commands until it exists.
    ///
    /// A protocol-fatal error stops execution and is returned; the failing
    /// command is dropped and later ones stay queued. Other failures are
    /// logged and counted as rejected.
    pub fn execute(
        &mut self,
        world: &mut W,
        map: MapId,
        tick: Tick,
    ) -> Result<ExecutionReport, HandlerError> {
        let mut report = ExecutionReport::default();
        if !map.is_global() && !world.map_exists(map) {
            if self.scheduler.has_run(map) {
                self.remove_map(map);
            } else {
                debug!("{:?} does not exist yet, keeping its commands", map);
            }
            return Ok(report);
        }

        self.executing = true;
        let mut fatal = None;
        while let Some(command) = self.scheduler.pop_ready(map, tick) {
            if let CommandKind::Custom(_) = command.kind {
                report.custom.push(command);
                continue;
            }
            match apply(&self.protocol, world, &command) {
                Ok(Handled::Applied) => report.executed += 1,
                Ok(Handled::Declined) => report.declined += 1,
                Err(err) if err.is_protocol_fatal() => {
                    warn!(
                        "Command at tick {} on {:?} broke the protocol: {}",
                        command.tick, command.map, err
                    );
                    fatal = Some(err);
                    break;
                }
                Err(err) => {
                    warn!(
                        "Rejected command at tick {} on {:?}: {}",
                        command.tick, command.map, err
                    );
                    report.rejected += 1;
                }
            }
        }
        self.executing = false;
        self.scheduler.mark_executed(map, tick);

        match fatal {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Drops a map's pending commands and refuses later ones.
    pub fn remove_map(&mut self, map: MapId) {
        self.scheduler.remove_map(map);
        self.sequencer.forget_map(map);
    }

    // Watching UI edits

    /// First phase of a watch: remembers the slot's value before the UI
    /// edits it. For a buffered field with a pending edit the slot shows the
    /// pending value, so the UI draws what the player last chose.
    pub fn observe(
        &mut self,
        world: &mut W,
        name: &str,
        target: Value,
        index: Value,
    ) -> Result<WatchToken, HandlerError> {
        let field = self.protocol.handlers.field(name)?;
        let sync_id = field.meta().sync_id;
        let ops = field.ops();
        let slot = Slot::new(target.as_ref(), index.as_ref());

        if field.is_buffered() && self.should_sync() {
            if let Some(data) = self.buffer.get(sync_id, &ops, slot) {
                let pending = ops.value.clone_value(data.to_send.as_ref());
                field.set(world, slot.target, slot.index, pending);
            }
        }
        let before = field
            .get(world, slot.target, slot.index)
            .unwrap_or_else(Value::null);

        Ok(WatchToken {
            sync_id,
            target,
            index,
            before,
        })
    }

    pub fn commit(&mut self, world: &mut W, token: WatchToken) -> Result<bool, HandlerError> {
        self.commit_at(world, token, Instant::now())
    }

    /// Last phase of a watch. An edit of a buffered field is recorded and
    /// the slot restored to the agreed value; any other edit is undone and
    /// replicated as a field command. Outside a session the edit stays.
    ///
    /// Returns whether anything was buffered or replicated.
    pub fn commit_at(
        &mut self,
        world: &mut W,
        token: WatchToken,
        now: Instant,
    ) -> Result<bool, HandlerError> {
        if !self.should_sync() {
            return Ok(false);
        }
        let field = self.protocol.handlers.field_by_id(token.sync_id)?;
        let ops = field.ops();
        let slot = Slot::new(token.target.as_ref(), token.index.as_ref());
        let Some(edited) = field.get(world, slot.target, slot.index) else {
            debug!("{}: watched slot disappeared", field.meta().name);
            return Ok(false);
        };

        if field.is_buffered() {
            let (restore, changed) = self.buffer.record(
                token.sync_id,
                &ops,
                slot,
                token.before.as_ref(),
                edited.as_ref(),
                now,
            );
            field.set(world, slot.target, slot.index, restore);
            return Ok(changed);
        }

        if ops.value.eq(edited.as_ref(), token.before.as_ref()) {
            return Ok(false);
        }
        field.set(
            world,
            slot.target,
            slot.index,
            ops.value.clone_value(token.before.as_ref()),
        );
        self.sync_field_by_id(world, token.sync_id, slot.target, edited.as_ref(), slot.index)
    }

    /// Opens a watch scope.
    pub fn watch_begin(&mut self) {
        self.watches.begin();
    }

    /// Observes a slot inside the innermost open scope.
    pub fn watch(
        &mut self,
        world: &mut W,
        name: &str,
        target: Value,
        index: Value,
    ) -> Result<(), HandlerError> {
        if !self.watches.is_open() {
            warn!("watch({}) outside of watch_begin / watch_end", name);
        }
        let token = self.observe(world, name, target, index)?;
        self.watches.push(token);
        Ok(())
    }

    /// Commits every slot observed in the innermost scope and closes it.
    /// Returns how many edits were replicated or buffered.
    pub fn watch_end(&mut self, world: &mut W) -> Result<usize, HandlerError> {
        let Some(tokens) = self.watches.end() else {
            warn!("watch_end without a matching watch_begin");
            return Ok(0);
        };
        let now = Instant::now();
        let mut committed = 0;
        let mut first_error = None;
        // every token is committed so no slot is left holding an edit
        for token in tokens {
            match self.commit_at(world, token, now) {
                Ok(true) => committed += 1,
                Ok(false) => {}
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(committed),
        }
    }

    /// Sends buffered edits whose debounce window has run out and forgets
    /// those the simulation has caught up with. Call once per frame.
    pub fn flush_buffered(&mut self, world: &W, now: Instant) -> Result<usize, HandlerError> {
        if !self.should_sync() {
            return Ok(0);
        }
        let window = self.protocol.config.debounce_window;
        let mut due = Vec::new();
        for sync_id in self.buffer.sync_ids() {
            let field = self.protocol.handlers.field_by_id(sync_id)?;
            let ops = field.ops();
            self.buffer.settle(
                sync_id,
                &ops,
                now,
                window,
                |target, index| field.get(world, target, index),
                &mut due,
            );
        }

        let mut sent = 0;
        for change in due {
            if self.sync_field_by_id(
                world,
                change.sync_id,
                change.target.as_ref(),
                change.value.as_ref(),
                change.index.as_ref(),
            )? {
                sent += 1;
            }
        }
        Ok(sent)
    }
}

fn encode_command<W: ObjectGraph + 'static>(
    world: &W,
    types: &TypeRegistry<W>,
    ui: &UiState,
    meta: &HandlerMeta,
    map: MapId,
    body: impl FnOnce(&mut WriteContext<'_, W>) -> Result<(), SerializationError>,
) -> Result<CommandEnvelope, HandlerError> {
    let mut writer = ByteWriter::new();
    {
        let mut ctx = WriteContext::new(world, &mut writer, types, map);
        ctx.write(&meta.sync_id)?;
        write_ambient(&mut ctx, meta.context, ui)?;
        body(&mut ctx)?;
    }
    Ok(CommandEnvelope::new(CommandKind::Sync, map, writer.to_bytes()))
}

fn apply<W: ObjectGraph + 'static>(
    protocol: &Protocol<W>,
    world: &mut W,
    command: &ScheduledCommand,
) -> Result<Handled, HandlerError> {
    let mut reader = ByteReader::new(&command.payload);
    let sync_id = SyncId::de(&mut reader)?;
    let handler = protocol
        .handlers
        .get(sync_id)
        .ok_or(HandlerError::UnknownSyncId { sync_id })?;

    let mut invocation = Invocation::new(command.map, command.tick);
    {
        let mut ctx = ReadContext::new(&*world, &mut reader, &protocol.types, command.map);
        read_ambient(&mut ctx, handler.meta().context, &mut invocation)?;
    }

    let handled = handler.handle(world, &mut reader, &protocol.types, &invocation)?;
    if handled == Handled::Applied && !reader.is_empty() {
        debug!(
            "{}: {} trailing payload bytes ignored",
            handler.meta().name,
            reader.remaining()
        );
    }
    Ok(handled)
}
