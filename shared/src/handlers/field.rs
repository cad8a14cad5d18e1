use std::any::Any;

use log::debug;
use lockstep_serde::ByteReader;

use crate::{
    handlers::{
        error::HandlerError,
        handler::{Handled, HandlerKind, HandlerMeta, HandlerOptions, Invocation, SyncHandler},
        member::{validate_member_path, MemberAccess},
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
    value::{Value, ValueOps, ValueRef},
};

type ApplyHook<W> = Box<dyn Fn(&mut W, ValueRef)>;

/// Equality and cloning for the three slots of a field command.
#[derive(Clone, Copy)]
pub struct FieldOps {
    pub value: ValueOps,
    pub target: ValueOps,
    pub index: ValueOps,
}

/// Replicates assignments to one member of the simulation.
///
/// The command carries the target, the new value and the index, in that
/// order. Targets that no longer resolve make the command decline.
pub struct SyncField<W> {
    meta: HandlerMeta,
    access: Box<dyn MemberAccess<W>>,
    target: Option<SyncType>,
    value_type: SyncType,
    index_type: Option<SyncType>,
    buffer_changes: bool,
    pre_apply: Option<ApplyHook<W>>,
    post_apply: Option<ApplyHook<W>>,
}

impl<W: ObjectGraph + 'static> SyncField<W> {
    /// A field named after its member path.
    pub fn new(access: impl MemberAccess<W>, value_type: SyncType) -> Self {
        Self {
            meta: HandlerMeta::new(access.path()),
            access: Box::new(access),
            target: None,
            value_type,
            index_type: None,
            buffer_changes: false,
            pre_apply: None,
            post_apply: None,
        }
    }

    pub fn target(mut self, target: SyncType) -> Self {
        self.target = Some(target);
        self
    }

    pub fn index(mut self, index: SyncType) -> Self {
        self.index_type = Some(index);
        self
    }

    /// Debounces UI edits: changes are recorded locally and sent once they
    /// have been stable for the debounce window.
    pub fn buffer_changes(mut self) -> Self {
        self.buffer_changes = true;
        self
    }

    /// Runs before the value is written on every peer, once the member is
    /// known to resolve.
    pub fn pre_apply(mut self, hook: impl Fn(&mut W, ValueRef) + 'static) -> Self {
        self.pre_apply = Some(Box::new(hook));
        self
    }

    /// Runs after the value is written on every peer.
    pub fn post_apply(mut self, hook: impl Fn(&mut W, ValueRef) + 'static) -> Self {
        self.post_apply = Some(Box::new(hook));
        self
    }

    pub fn is_buffered(&self) -> bool {
        self.buffer_changes
    }

    pub fn path(&self) -> &str {
        self.access.path()
    }

    pub fn ops(&self) -> FieldOps {
        FieldOps {
            value: self.access.value_ops(),
            target: self.access.target_ops(),
            index: self.access.index_ops(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ProtocolError> {
        validate_member_path(self.access.path(), self.index_type.is_some())?;
        if self.access.is_indexed() != self.index_type.is_some() {
            return Err(ProtocolError::InvalidMemberPath {
                path: self.access.path().to_string(),
                reason: "accessor and declared index type disagree".to_string(),
            });
        }
        Ok(())
    }

    pub fn get(&self, world: &W, target: ValueRef, index: ValueRef) -> Option<Value> {
        self.access.get(world, target, index)
    }

    pub fn set(&self, world: &mut W, target: ValueRef, index: ValueRef, value: Value) -> bool {
        self.access.set(world, target, index, value)
    }

    /// Objects that decide which map the command goes to.
    pub(crate) fn anchors(&self, target: ValueRef) -> Option<ObjectId> {
        self.target.as_ref()?.object_id(target)
    }

    pub(crate) fn write_body(
        &self,
        ctx: &mut WriteContext<'_, W>,
        target: ValueRef,
        value: ValueRef,
        index: ValueRef,
    ) -> Result<(), SerializationError> {
        if let Some(target_type) = &self.target {
            ctx.write_value(target_type, target)?;
        }
        ctx.write_value(&self.value_type, value)?;
        if let Some(index_type) = &self.index_type {
            ctx.write_value(index_type, index)?;
        }
        Ok(())
    }
}

impl<W: ObjectGraph + 'static> HandlerOptions for SyncField<W> {
    fn options_mut(&mut self) -> &mut HandlerMeta {
        &mut self.meta
    }
}

impl<W: ObjectGraph + 'static> SyncHandler<W> for SyncField<W> {
    fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut HandlerMeta {
        &mut self.meta
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Field
    }

    fn handle(
        &self,
        world: &mut W,
        reader: &mut ByteReader,
        registry: &TypeRegistry<W>,
        invocation: &Invocation,
    ) -> Result<Handled, HandlerError> {
        let (target, value, index) = {
            let mut ctx = ReadContext::new(&*world, reader, registry, invocation.map);
            let target = match &self.target {
                Some(target_type) => Some(ctx.read_value(target_type)?),
                None => None,
            };
            let value = ctx.read_value(&self.value_type)?;
            let index = match &self.index_type {
                Some(index_type) => ctx.read_value(index_type)?,
                None => Value::null(),
            };
            (target, value, index)
        };

        let target_ref = match &target {
            Some(target) if target.is_null() => {
                debug!("{}: target no longer exists, declining", self.meta.name);
                return Ok(Handled::Declined);
            }
            Some(target) => target.as_ref(),
            None => None,
        };

        if self.access.get(world, target_ref, index.as_ref()).is_none() {
            debug!("{}: member no longer resolves, declining", self.meta.name);
            return Ok(Handled::Declined);
        }
        if let Some(hook) = &self.pre_apply {
            hook(world, target_ref);
        }
        if !self.access.set(world, target_ref, index.as_ref(), value) {
            debug!("{}: member did not accept the value, declining", self.meta.name);
            return Ok(Handled::Declined);
        }
        if let Some(hook) = &self.post_apply {
            hook(world, target_ref);
        }
        Ok(Handled::Applied)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
