use std::any::Any;

use log::debug;
use lockstep_serde::ByteReader;

use crate::{
    handlers::{
        args::{arg_anchors, check_arg_count, read_args, write_args, ArgSpec},
        error::HandlerError,
        handler::{Handled, HandlerKind, HandlerMeta, HandlerOptions, Invocation, SyncHandler},
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

type Enumerate<W, C> = Box<dyn Fn(&W, ValueRef, &Args) -> Vec<C>>;
type Apply<W, C> = Box<dyn Fn(&mut W, ValueRef, C, Args, &Invocation)>;

/// Replicates picking one option out of a list the simulation can rebuild
/// on every peer, such as a float menu or a gizmo's dropdown.
///
/// Only the option's index travels. The receiver enumerates the options
/// again and applies the one at the same index.
pub struct SyncChoice<W, C> {
    meta: HandlerMeta,
    target: Option<SyncType>,
    args: Vec<ArgSpec>,
    enumerate: Enumerate<W, C>,
    apply: Apply<W, C>,
}

impl<W: ObjectGraph + 'static, C: 'static> SyncChoice<W, C> {
    pub fn new(
        name: &str,
        enumerate: impl Fn(&W, ValueRef, &Args) -> Vec<C> + 'static,
        apply: impl Fn(&mut W, ValueRef, C, Args, &Invocation) + 'static,
    ) -> Self {
        Self {
            meta: HandlerMeta::new(name),
            target: None,
            args: Vec::new(),
            enumerate: Box::new(enumerate),
            apply: Box::new(apply),
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

    pub fn options(&self, world: &W, target: ValueRef, args: &Args) -> Vec<C> {
        (self.enumerate)(world, target, args)
    }

    pub(crate) fn validate(&self) -> Result<(), ProtocolError> {
        validate_member_path(&self.meta.name, false)
    }

    pub(crate) fn check_args(&self, args: &Args) -> Result<(), HandlerError> {
        check_arg_count(&self.meta.name, &self.args, args)
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
        index: u16,
    ) -> Result<(), SerializationError> {
        if let Some(target_type) = &self.target {
            ctx.write_value(target_type, target)?;
        }
        write_args(ctx, &self.args, args)?;
        ctx.write(&index)
    }
}

impl<W: ObjectGraph + 'static, C: PartialEq + 'static> SyncChoice<W, C> {
    /// Wire index of `choice` among the options currently offered.
    pub(crate) fn index_of(
        &self,
        world: &W,
        target: ValueRef,
        args: &Args,
        choice: &C,
    ) -> Option<u16> {
        let position = self
            .options(world, target, args)
            .iter()
            .position(|option| option == choice)?;
        u16::try_from(position).ok()
    }
}

impl<W: ObjectGraph + 'static, C: 'static> HandlerOptions for SyncChoice<W, C> {
    fn options_mut(&mut self) -> &mut HandlerMeta {
        &mut self.meta
    }
}

impl<W: ObjectGraph + 'static, C: 'static> SyncHandler<W> for SyncChoice<W, C> {
    fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut HandlerMeta {
        &mut self.meta
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Choice
    }

    fn handle(
        &self,
        world: &mut W,
        reader: &mut ByteReader,
        registry: &TypeRegistry<W>,
        invocation: &Invocation,
    ) -> Result<Handled, HandlerError> {
        let (target, args, index) = {
            let mut ctx = ReadContext::new(&*world, reader, registry, invocation.map);
            let target = match &self.target {
                Some(target_type) => Some(ctx.read_value(target_type)?),
                None => None,
            };
            let args = read_args(&mut ctx, &self.args)?;
            let index: u16 = ctx.read()?;
            (target, args, index)
        };

        if target.as_ref().is_some_and(|target| target.is_null()) {
            debug!("{}: target no longer exists, declining", self.meta.name);
            return Ok(Handled::Declined);
        }
        let target_ref = target.as_ref().and_then(|target| target.as_ref());

        let mut options = (self.enumerate)(&*world, target_ref, &args);
        if usize::from(index) >= options.len() {
            debug!(
                "{}: option {} not offered here ({} options), declining",
                self.meta.name,
                index,
                options.len()
            );
            return Ok(Handled::Declined);
        }
        let choice = options.swap_remove(usize::from(index));
        (self.apply)(world, target_ref, choice, args, invocation);
        Ok(Handled::Applied)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
