use std::any::Any;

use lockstep_serde::{Blob, Serde};

use crate::{
    config::EngineConfig,
    handlers::{
        choice::SyncChoice, delegate::SyncDelegate, field::SyncField, handler_list::SyncHandlers,
        method::SyncMethod,
    },
    serialization::{
        defs::CatalogEntry,
        references::{ContainerKind, ObjectGraph},
        registry::{BaseKind, TypeNode, TypeRegistry},
        type_key::TypeKey,
        worker::{SerdeWorker, SyncWorker},
    },
    types::{CellPos, MapId},
};

pub mod error;
pub use error::ProtocolError;

// Protocol Plugin
pub trait ProtocolPlugin<W> {
    fn build(&self, protocol: &mut Protocol<W>);
}

/// Everything peers must agree on before a session starts: the type
/// registry, the handler list and the engine configuration.
///
/// Builder calls panic when the protocol is already locked; every one of
/// them has a `try_` variant that returns a [`ProtocolError`] instead.
pub struct Protocol<W> {
    pub types: TypeRegistry<W>,
    pub handlers: SyncHandlers<W>,
    pub config: EngineConfig,
    locked: bool,
}

impl<W: ObjectGraph + 'static> Default for Protocol<W> {
    fn default() -> Self {
        let mut types = TypeRegistry::new();
        register_serde::<W, u8>(&mut types);
        register_serde::<W, i8>(&mut types);
        register_serde::<W, u16>(&mut types);
        register_serde::<W, i16>(&mut types);
        register_serde::<W, u32>(&mut types);
        register_serde::<W, i32>(&mut types);
        register_serde::<W, u64>(&mut types);
        register_serde::<W, i64>(&mut types);
        register_serde::<W, f32>(&mut types);
        register_serde::<W, f64>(&mut types);
        register_serde::<W, bool>(&mut types);
        register_serde::<W, String>(&mut types);
        register_serde::<W, Blob>(&mut types);
        register_serde::<W, CellPos>(&mut types);
        register_serde::<W, MapId>(&mut types);

        Self {
            types,
            handlers: SyncHandlers::new(),
            config: EngineConfig::default(),
            locked: false,
        }
    }
}

// A fresh registry is never locked, so this cannot fail.
fn register_serde<W: ObjectGraph + 'static, T: Serde + 'static>(types: &mut TypeRegistry<W>) {
    let _ = types.add_worker::<T>(SerdeWorker::<T>::new());
}

impl<W: ObjectGraph + 'static> Protocol<W> {
    pub fn builder() -> Self {
        Self::default()
    }

    pub fn add_plugin<P: ProtocolPlugin<W>>(&mut self, plugin: P) -> &mut Self {
        self.check_lock();
        plugin.build(self);
        self
    }

    pub fn config(&mut self, config: EngineConfig) -> &mut Self {
        self.check_lock();
        self.config = config;
        self
    }

    /// Dispatches `T` through its [`Serde`] impl.
    pub fn add_serde<T: Serde + 'static>(&mut self) -> &mut Self {
        if let Err(err) = self.try_add_serde::<T>() {
            panic!("{}", err);
        }
        self
    }

    pub fn add_worker<T: ?Sized + 'static>(&mut self, worker: impl SyncWorker<W>) -> &mut Self {
        if let Err(err) = self.try_add_worker::<T>(worker) {
            panic!("{}", err);
        }
        self
    }

    pub fn add_constructor<T: Any>(&mut self, constructor: impl Fn() -> T + 'static) -> &mut Self {
        if let Err(err) = self.try_add_constructor(constructor) {
            panic!("{}", err);
        }
        self
    }

    pub fn add_base<B: Any>(
        &mut self,
        name: &str,
        kind: BaseKind,
        runtime_key: impl Fn(&B) -> TypeKey + 'static,
    ) -> &mut Self {
        if let Err(err) = self.try_add_base(name, kind, runtime_key) {
            panic!("{}", err);
        }
        self
    }

    pub fn add_type(&mut self, node: TypeNode) -> &mut Self {
        if let Err(err) = self.try_add_type(node) {
            panic!("{}", err);
        }
        self
    }

    /// Registers a container kind and returns the tag it travels as.
    ///
    /// # Panics
    ///
    /// If the protocol is locked, the name is taken, or 255 kinds already
    /// exist.
    pub fn add_container_kind(&mut self, name: &str) -> ContainerKind {
        match self.try_add_container_kind(name) {
            Ok(kind) => kind,
            Err(err) => panic!("{}", err),
        }
    }

    pub fn add_defs<D: CatalogEntry>(&mut self, defs: impl IntoIterator<Item = D>) -> &mut Self {
        if let Err(err) = self.try_add_defs(defs) {
            panic!("{}", err);
        }
        self
    }

    pub fn add_field(&mut self, field: SyncField<W>) -> &mut Self {
        if let Err(err) = self.try_add_field(field) {
            panic!("{}", err);
        }
        self
    }

    pub fn add_method(&mut self, method: SyncMethod<W>) -> &mut Self {
        if let Err(err) = self.try_add_method(method) {
            panic!("{}", err);
        }
        self
    }

    pub fn add_delegate<E: Default + 'static>(&mut self, delegate: SyncDelegate<W, E>) -> &mut Self {
        if let Err(err) = self.try_add_delegate(delegate) {
            panic!("{}", err);
        }
        self
    }

    pub fn add_choice<C: 'static>(&mut self, choice: SyncChoice<W, C>) -> &mut Self {
        if let Err(err) = self.try_add_choice(choice) {
            panic!("{}", err);
        }
        self
    }

    // Non-panicking builder methods

    pub fn try_add_plugin<P: ProtocolPlugin<W>>(
        &mut self,
        plugin: P,
    ) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        plugin.build(self);
        Ok(self)
    }

    pub fn try_config(&mut self, config: EngineConfig) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.config = config;
        Ok(self)
    }

    pub fn try_add_serde<T: Serde + 'static>(&mut self) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.types.add_worker::<T>(SerdeWorker::<T>::new())?;
        Ok(self)
    }

    pub fn try_add_worker<T: ?Sized + 'static>(
        &mut self,
        worker: impl SyncWorker<W>,
    ) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.types.add_worker::<T>(worker)?;
        Ok(self)
    }

    pub fn try_add_constructor<T: Any>(
        &mut self,
        constructor: impl Fn() -> T + 'static,
    ) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.types.add_constructor(constructor)?;
        Ok(self)
    }

    pub fn try_add_base<B: Any>(
        &mut self,
        name: &str,
        kind: BaseKind,
        runtime_key: impl Fn(&B) -> TypeKey + 'static,
    ) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.types.add_base(name, kind, runtime_key)?;
        Ok(self)
    }

    pub fn try_add_type(&mut self, node: TypeNode) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.types.add_type(node)?;
        Ok(self)
    }

    pub fn try_add_container_kind(&mut self, name: &str) -> Result<ContainerKind, ProtocolError> {
        self.try_check_lock()?;
        self.types.containers_mut().add(name)
    }

    pub fn try_add_defs<D: CatalogEntry>(
        &mut self,
        defs: impl IntoIterator<Item = D>,
    ) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.types.defs_mut().add(defs)?;
        Ok(self)
    }

    pub fn try_add_field(&mut self, field: SyncField<W>) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        field.validate()?;
        self.handlers.add(field)?;
        Ok(self)
    }

    pub fn try_add_method(&mut self, method: SyncMethod<W>) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        method.validate()?;
        self.handlers.add(method)?;
        Ok(self)
    }

    pub fn try_add_delegate<E: Default + 'static>(
        &mut self,
        delegate: SyncDelegate<W, E>,
    ) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        delegate.validate()?;
        self.handlers.add(delegate)?;
        Ok(self)
    }

    pub fn try_add_choice<C: 'static>(
        &mut self,
        choice: SyncChoice<W, C>,
    ) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        choice.validate()?;
        self.handlers.add(choice)?;
        Ok(self)
    }

    /// Freezes the type registry and assigns handler sync ids.
    pub fn try_lock(&mut self) -> Result<(), ProtocolError> {
        self.try_check_lock()?;
        self.types.lock()?;
        self.handlers.lock()?;
        self.locked = true;
        Ok(())
    }

    /// # Panics
    ///
    /// If the protocol is already locked or the type tree is invalid.
    pub fn lock(&mut self) {
        if let Err(err) = self.try_lock() {
            panic!("{}", err);
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Checks if protocol is locked without panicking
    /// Returns Err if protocol is locked
    pub fn try_check_lock(&self) -> Result<(), ProtocolError> {
        if self.locked {
            Err(ProtocolError::AlreadyLocked)
        } else {
            Ok(())
        }
    }

    /// Checks if protocol is locked, panics if it is
    pub fn check_lock(&self) {
        if self.locked {
            panic!("Protocol already locked!");
        }
    }

    pub fn build(&mut self) -> Self {
        std::mem::take(self)
    }
}
