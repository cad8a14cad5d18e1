use std::{any::type_name, collections::HashMap};

use log::info;

use crate::{
    handlers::{
        choice::SyncChoice,
        delegate::SyncDelegate,
        error::HandlerError,
        field::SyncField,
        handler::{HandlerKind, SyncHandler},
        method::SyncMethod,
    },
    protocol::ProtocolError,
    serialization::references::ObjectGraph,
    types::SyncId,
};

/// The ordered list of every registered handler.
///
/// Once locked, a handler's position is its sync id. The order is part of
/// the wire contract, so peers compare [`SyncHandlers::list_hash`] before a
/// session starts.
pub struct SyncHandlers<W> {
    handlers: Vec<Box<dyn SyncHandler<W>>>,
    by_name: HashMap<String, SyncId>,
    list_hash: u32,
    locked: bool,
}

impl<W> Default for SyncHandlers<W> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            by_name: HashMap::new(),
            list_hash: 0,
            locked: false,
        }
    }
}

impl<W: ObjectGraph + 'static> SyncHandlers<W> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handler: impl SyncHandler<W>) -> Result<(), ProtocolError> {
        if self.locked {
            return Err(ProtocolError::AlreadyLocked);
        }
        let name = &handler.meta().name;
        if self.handlers.iter().any(|existing| &existing.meta().name == name) {
            return Err(ProtocolError::DuplicateHandler { name: name.clone() });
        }
        self.handlers.push(Box::new(handler));
        Ok(())
    }

    /// Orders handlers by version, keeping registration order among equal
    /// versions, and assigns sync ids.
    pub fn lock(&mut self) -> Result<(), ProtocolError> {
        if self.locked {
            return Err(ProtocolError::AlreadyLocked);
        }
        self.handlers.sort_by_key(|handler| handler.meta().version);

        let mut hasher = crc32fast::Hasher::new();
        for (index, handler) in self.handlers.iter_mut().enumerate() {
            let sync_id = index as SyncId;
            let meta = handler.meta_mut();
            meta.sync_id = sync_id;
            self.by_name.insert(meta.name.clone(), sync_id);

            hasher.update(meta.name.as_bytes());
            hasher.update(&[0]);
            hasher.update(&meta.version.to_le_bytes());
        }
        self.list_hash = hasher.finalize();
        self.locked = true;

        info!(
            "Locked {} sync handlers, list hash {:#010x}",
            self.handlers.len(),
            self.list_hash
        );
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// CRC32 over every handler's name and version, in sync id order.
    pub fn list_hash(&self) -> u32 {
        self.list_hash
    }

    pub fn get(&self, sync_id: SyncId) -> Option<&dyn SyncHandler<W>> {
        let index = usize::try_from(sync_id).ok()?;
        self.handlers.get(index).map(|handler| handler.as_ref())
    }

    pub fn sync_id(&self, name: &str) -> Option<SyncId> {
        self.by_name.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Result<&dyn SyncHandler<W>, HandlerError> {
        self.sync_id(name)
            .and_then(|sync_id| self.get(sync_id))
            .ok_or_else(|| HandlerError::UnknownHandler {
                name: name.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn SyncHandler<W>> {
        self.handlers.iter().map(|handler| handler.as_ref())
    }

    pub fn field(&self, name: &str) -> Result<&SyncField<W>, HandlerError> {
        let handler = self.by_name(name)?;
        expect_kind(handler, HandlerKind::Field)?;
        downcast(handler)
    }

    pub fn field_by_id(&self, sync_id: SyncId) -> Result<&SyncField<W>, HandlerError> {
        let handler = self
            .get(sync_id)
            .ok_or(HandlerError::UnknownSyncId { sync_id })?;
        expect_kind(handler, HandlerKind::Field)?;
        downcast(handler)
    }

    pub fn method(&self, name: &str) -> Result<&SyncMethod<W>, HandlerError> {
        let handler = self.by_name(name)?;
        expect_kind(handler, HandlerKind::Method)?;
        downcast(handler)
    }

    pub fn delegate<E: Default + 'static>(
        &self,
        name: &str,
    ) -> Result<&SyncDelegate<W, E>, HandlerError> {
        let handler = self.by_name(name)?;
        expect_kind(handler, HandlerKind::Delegate)?;
        downcast(handler)
    }

    pub fn choice<C: 'static>(&self, name: &str) -> Result<&SyncChoice<W, C>, HandlerError> {
        let handler = self.by_name(name)?;
        expect_kind(handler, HandlerKind::Choice)?;
        downcast(handler)
    }
}

fn expect_kind<W: 'static>(
    handler: &dyn SyncHandler<W>,
    expected: HandlerKind,
) -> Result<(), HandlerError> {
    if handler.kind() == expected {
        Ok(())
    } else {
        Err(HandlerError::KindMismatch {
            name: handler.meta().name.clone(),
            expected,
            found: handler.kind(),
        })
    }
}

fn downcast<'a, W: 'static, H: 'static>(
    handler: &'a dyn SyncHandler<W>,
) -> Result<&'a H, HandlerError> {
    handler
        .as_any()
        .downcast_ref::<H>()
        .ok_or_else(|| HandlerError::TypeMismatch {
            name: handler.meta().name.clone(),
            type_name: type_name::<H>(),
        })
}
