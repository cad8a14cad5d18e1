use std::{
    any::Any,
    cell::Cell,
    time::{Duration, Instant},
};

use log::debug;
use lockstep_serde::ByteReader;

use crate::{
    handlers::{
        args::{any_arg_null, arg_anchors, check_arg_count, read_args, write_args, ArgSpec},
        error::HandlerError,
        handler::{
            Handled, HandlerKind, HandlerMeta, HandlerOptions, Invocation, SyncHandler, UiState,
        },
        member::validate_member_path,
    },
    protocol::ProtocolError,
    serialization::{
        context::{ReadContext, WriteContext},
        error::SerializationError,
        references::ObjectGraph,
        registry::TypeRegistry,
        sync_type::SyncType,
    },
    types::ObjectId,
    value::{Args, ValueRef},
};

type Invoke<W> = Box<dyn Fn(&mut W, ValueRef, Args, &Invocation)>;

/// Replicates calls to one method of the simulation.
///
/// Static methods have no target. Instance methods decline on peers where the
/// target no longer exists.
pub struct SyncMethod<W> {
    meta: HandlerMeta,
    target: Option<SyncType>,
    args: Vec<ArgSpec>,
    invoke: Invoke<W>,
    cancel_if_any_arg_null: bool,
    cancel_if_no_selected: bool,
    min_time: Option<Duration>,
    last_sent: Cell<Option<Instant>>,
}

impl<W: ObjectGraph + 'static> SyncMethod<W> {
    pub fn new(name: &str, invoke: impl Fn(&mut W, ValueRef, Args, &Invocation) + 'static) -> Self {
        Self {
            meta: HandlerMeta::new(name),
            target: None,
            args: Vec::new(),
            invoke: Box::new(invoke),
            cancel_if_any_arg_null: false,
            cancel_if_no_selected: false,
            min_time: None,
            last_sent: Cell::new(None),
        }
    }

    pub fn target(mut self, target: SyncType) -> Self {
        self.target = Some(target);
        self
    }

    pub fn arg(mut self, arg: impl Into<ArgSpec>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn cancel_if_any_arg_null(mut self) -> Self {
        self.cancel_if_any_arg_null = true;
        self
    }

    pub fn cancel_if_no_selected(mut self) -> Self {
        self.cancel_if_no_selected = true;
        self
    }

    /// Drops local calls made less than `min_time` after the previous
    /// command of this method was sent.
    pub fn min_time(mut self, min_time: Duration) -> Self {
        self.min_time = Some(min_time);
        self
    }

    pub fn arg_specs(&self) -> &[ArgSpec] {
        &self.args
    }

    pub(crate) fn validate(&self) -> Result<(), ProtocolError> {
        validate_member_path(&self.meta.name, false)
    }

    pub(crate) fn check_args(&self, args: &Args) -> Result<(), HandlerError> {
        check_arg_count(&self.meta.name, &self.args, args)
    }

    /// Whether a local call should produce a command. A call that is
    /// cancelled or throttled here is swallowed.
    /// Cancel guards. A refused call does not happen at all.
    pub(crate) fn admit(&self, args: &Args, ui: &UiState) -> bool {
        if self.cancel_if_any_arg_null && any_arg_null(&self.args, args) {
            debug!("{}: null argument, call cancelled", self.meta.name);
            return false;
        }
        if self.cancel_if_no_selected && ui.selected.is_empty() {
            debug!("{}: nothing selected, call cancelled", self.meta.name);
            return false;
        }
        true
    }

    /// Whether a call at `now` falls inside the `min_time` of the last send.
    pub(crate) fn throttled(&self, now: Instant) -> bool {
        if let (Some(min_time), Some(last)) = (self.min_time, self.last_sent.get()) {
            if now.saturating_duration_since(last) < min_time {
                debug!("{}: throttled", self.meta.name);
                return true;
            }
        }
        false
    }

    pub(crate) fn mark_sent(&self, now: Instant) {
        if self.min_time.is_some() {
            self.last_sent.set(Some(now));
        }
    }

    pub(crate) fn anchors<'a>(
        &'a self,
        target: ValueRef<'a>,
        args: &'a Args,
    ) -> impl Iterator<Item = ObjectId> + 'a {
        self.target
            .as_ref()
            .and_then(|target_type| target_type.object_id(target))
            .into_iter()
            .chain(arg_anchors(&self.args, args))
    }

    pub(crate) fn write_body(
        &self,
        ctx: &mut WriteContext<'_, W>,
        target: ValueRef,
        args: &Args,
    ) -> Result<(), SerializationError> {
        if let Some(target_type) = &self.target {
            ctx.write_value(target_type, target)?;
        }
        write_args(ctx, &self.args, args)
    }
}

impl<W: ObjectGraph + 'static> HandlerOptions for SyncMethod<W> {
    fn options_mut(&mut self) -> &mut HandlerMeta {
        &mut self.meta
    }
}

impl<W: ObjectGraph + 'static> SyncHandler<W> for SyncMethod<W> {
    fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut HandlerMeta {
        &mut self.meta
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Method
    }

    fn handle(
        &self,
        world: &mut W,
        reader: &mut ByteReader,
        registry: &TypeRegistry<W>,
        invocation: &Invocation,
    ) -> Result<Handled, HandlerError> {
        let (target, args) = {
            let mut ctx = ReadContext::new(&*world, reader, registry, invocation.map);
            let target = match &self.target {
                Some(target_type) => Some(ctx.read_value(target_type)?),
                None => None,
            };
            (target, read_args(&mut ctx, &self.args)?)
        };

        if target.as_ref().is_some_and(|target| target.is_null()) {
            debug!("{}: target no longer exists, declining", self.meta.name);
            return Ok(Handled::Declined);
        }
        if self.cancel_if_any_arg_null && any_arg_null(&self.args, &args) {
            debug!("{}: argument no longer resolves, declining", self.meta.name);
            return Ok(Handled::Declined);
        }
        if self.cancel_if_no_selected && invocation.selected.is_empty() {
            debug!("{}: no selected objects left, declining", self.meta.name);
            return Ok(Handled::Declined);
        }

        let target_ref = target.as_ref().and_then(|target| target.as_ref());
        (self.invoke)(world, target_ref, args, invocation);
        Ok(Handled::Applied)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
