use std::{any::Any, marker::PhantomData};

use lockstep_serde::Serde;

use crate::{
    serialization::{
        context::{ReadContext, WriteContext},
        error::SerializationError,
        references::ObjectGraph,
    },
    value::Value,
};

/// Outcome of a single worker attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerResult {
    Handled,
    /// The worker does not handle this value. The registry restores the
    /// cursor and tries the previously registered worker.
    Declined,
}

/// An (encode, decode) pair registered for one node of the type registry.
///
/// Workers see values as the storage type of the slot being encoded. For a
/// polymorphic base registered as `Box<dyn Trait>` that is the box, whatever
/// node the worker is registered on.
pub trait SyncWorker<W>: 'static {
    fn write(
        &self,
        value: &dyn Any,
        ctx: &mut WriteContext<'_, W>,
    ) -> Result<WorkerResult, SerializationError>;

    /// Decodes into `slot`. When the node has a constructor the slot already
    /// holds a fresh default instance of the runtime type.
    fn read(
        &self,
        slot: &mut Value,
        ctx: &mut ReadContext<'_, '_, W>,
    ) -> Result<WorkerResult, SerializationError>;
}

/// Worker for any type implementing [`Serde`].
pub struct SerdeWorker<T> {
    phantom_t: PhantomData<fn() -> T>,
}

impl<T> SerdeWorker<T> {
    pub fn new() -> Self {
        Self {
            phantom_t: PhantomData,
        }
    }
}

impl<T> Default for SerdeWorker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: ObjectGraph + 'static, T: Serde + 'static> SyncWorker<W> for SerdeWorker<T> {
    fn write(
        &self,
        value: &dyn Any,
        ctx: &mut WriteContext<'_, W>,
    ) -> Result<WorkerResult, SerializationError> {
        let Some(value) = value.downcast_ref::<T>() else {
            return Ok(WorkerResult::Declined);
        };
        ctx.write(value)?;
        Ok(WorkerResult::Handled)
    }

    fn read(
        &self,
        slot: &mut Value,
        ctx: &mut ReadContext<'_, '_, W>,
    ) -> Result<WorkerResult, SerializationError> {
        *slot = Value::new(ctx.read::<T>()?);
        Ok(WorkerResult::Handled)
    }
}

type WriteFn<W, T> =
    dyn Fn(&T, &mut WriteContext<'_, W>) -> Result<WorkerResult, SerializationError>;
type ReadFn<W> =
    dyn Fn(&mut Value, &mut ReadContext<'_, '_, W>) -> Result<WorkerResult, SerializationError>;

/// Worker built from a pair of closures over the storage type `T`.
pub struct FnWorker<W, T> {
    write: Box<WriteFn<W, T>>,
    read: Box<ReadFn<W>>,
}

impl<W: 'static, T: 'static> FnWorker<W, T> {
    pub fn new(
        write: impl Fn(&T, &mut WriteContext<'_, W>) -> Result<WorkerResult, SerializationError>
            + 'static,
        read: impl Fn(&mut Value, &mut ReadContext<'_, '_, W>) -> Result<WorkerResult, SerializationError>
            + 'static,
    ) -> Self {
        Self {
            write: Box::new(write),
            read: Box::new(read),
        }
    }
}

impl<W: ObjectGraph + 'static, T: 'static> SyncWorker<W> for FnWorker<W, T> {
    fn write(
        &self,
        value: &dyn Any,
        ctx: &mut WriteContext<'_, W>,
    ) -> Result<WorkerResult, SerializationError> {
        let Some(value) = value.downcast_ref::<T>() else {
            return Ok(WorkerResult::Declined);
        };
        (self.write)(value, ctx)
    }

    fn read(
        &self,
        slot: &mut Value,
        ctx: &mut ReadContext<'_, '_, W>,
    ) -> Result<WorkerResult, SerializationError> {
        (self.read)(slot, ctx)
    }
}
