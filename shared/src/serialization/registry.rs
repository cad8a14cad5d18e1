use std::{
    any::Any,
    collections::{HashMap, HashSet, VecDeque},
};

use log::{debug, info};

use crate::{
    protocol::ProtocolError,
    serialization::{
        context::{ReadContext, WriteContext},
        defs::DefCatalog,
        error::SerializationError,
        references::{ContainerKinds, ObjectGraph},
        type_key::TypeKey,
        worker::{SyncWorker, WorkerResult},
    },
    value::Value,
};

/// Whether a polymorphic base is walked as a class (parent chain only) or as
/// an interface (parent chain plus implemented interfaces).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaseKind {
    Class,
    Interface,
}

type Constructor = Box<dyn Fn() -> Box<dyn Any>>;
type RuntimeKeyFn = Box<dyn Fn(&dyn Any) -> Option<TypeKey>>;

/// Description of one node of the type tree: a concrete or abstract subtype
/// below one or more polymorphic bases.
pub struct TypeNode {
    key: TypeKey,
    name: String,
    parent: Option<TypeKey>,
    interfaces: Vec<TypeKey>,
    constructor: Option<Constructor>,
}

impl TypeNode {
    /// `name` is the stable name used to order subtype arrays. It must be
    /// identical on every peer.
    pub fn new<T: ?Sized + 'static>(name: &str) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            name: name.to_string(),
            parent: None,
            interfaces: Vec::new(),
            constructor: None,
        }
    }

    pub fn extends<P: ?Sized + 'static>(mut self) -> Self {
        self.parent = Some(TypeKey::of::<P>());
        self
    }

    pub fn implements<I: ?Sized + 'static>(mut self) -> Self {
        self.interfaces.push(TypeKey::of::<I>());
        self
    }

    /// Makes the node concrete. Decoding a value of this runtime type starts
    /// from the constructed instance, in the storage type `B` of the slot.
    pub fn constructor<B: Any>(mut self, constructor: impl Fn() -> B + 'static) -> Self {
        self.constructor = Some(Box::new(move || Box::new(constructor()) as Box<dyn Any>));
        self
    }
}

struct TypeEntry<W> {
    name: String,
    parent: Option<TypeKey>,
    interfaces: Vec<TypeKey>,
    constructor: Option<Constructor>,
    workers: Vec<Box<dyn SyncWorker<W>>>,
}

impl<W> TypeEntry<W> {
    fn new(name: String) -> Self {
        Self {
            name,
            parent: None,
            interfaces: Vec::new(),
            constructor: None,
            workers: Vec::new(),
        }
    }

    fn fresh_slot(&self) -> Value {
        match &self.constructor {
            Some(constructor) => Value::from_box(constructor()),
            None => Value::null(),
        }
    }
}

struct BaseEntry {
    name: String,
    kind: BaseKind,
    runtime_key: RuntimeKeyFn,
    subtypes: Vec<TypeKey>,
    subtype_index: HashMap<TypeKey, u16>,
}

/// Type-directed dispatch table mapping declared types to their workers.
///
/// Built through the [`Protocol`](crate::Protocol) builder and read-only
/// once locked.
pub struct TypeRegistry<W> {
    entries: HashMap<TypeKey, TypeEntry<W>>,
    bases: HashMap<TypeKey, BaseEntry>,
    // (base, runtime type) -> nodes with workers, most specific first
    candidates: HashMap<(TypeKey, TypeKey), Vec<TypeKey>>,
    defs: DefCatalog,
    containers: ContainerKinds,
    locked: bool,
}

impl<W> Default for TypeRegistry<W> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            bases: HashMap::new(),
            candidates: HashMap::new(),
            defs: DefCatalog::new(),
            containers: ContainerKinds::new(),
            locked: false,
        }
    }
}

impl<W: ObjectGraph + 'static> TypeRegistry<W> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn defs(&self) -> &DefCatalog {
        &self.defs
    }

    pub fn defs_mut(&mut self) -> &mut DefCatalog {
        &mut self.defs
    }

    pub fn containers(&self) -> &ContainerKinds {
        &self.containers
    }

    pub fn containers_mut(&mut self) -> &mut ContainerKinds {
        &mut self.containers
    }

    fn check_unlocked(&self) -> Result<(), ProtocolError> {
        if self.locked {
            Err(ProtocolError::AlreadyLocked)
        } else {
            Ok(())
        }
    }

    /// Adds a worker for type `T`. Later workers for the same type are tried
    /// first and may decline in favour of earlier ones.
    pub fn add_worker<T: ?Sized + 'static>(
        &mut self,
        worker: impl SyncWorker<W>,
    ) -> Result<(), ProtocolError> {
        self.check_unlocked()?;
        let key = TypeKey::of::<T>();
        self.entries
            .entry(key)
            .or_insert_with(|| TypeEntry::new(key.name().to_string()))
            .workers
            .push(Box::new(worker));
        Ok(())
    }

    /// Registers a constructor for an explicitly dispatched type, so decoding
    /// starts from a fresh default instance.
    pub fn add_constructor<T: Any>(
        &mut self,
        constructor: impl Fn() -> T + 'static,
    ) -> Result<(), ProtocolError> {
        self.check_unlocked()?;
        let key = TypeKey::of::<T>();
        self.entries
            .entry(key)
            .or_insert_with(|| TypeEntry::new(key.name().to_string()))
            .constructor = Some(Box::new(move || Box::new(constructor()) as Box<dyn Any>));
        Ok(())
    }

    /// Registers `B` as a polymorphic base. Values declared as `B` carry
    /// their runtime type as an index into the base's subtype array.
    pub fn add_base<B: Any>(
        &mut self,
        name: &str,
        kind: BaseKind,
        runtime_key: impl Fn(&B) -> TypeKey + 'static,
    ) -> Result<(), ProtocolError> {
        self.check_unlocked()?;
        let key = TypeKey::of::<B>();
        if self.bases.contains_key(&key) {
            return Err(ProtocolError::DuplicateType {
                name: name.to_string(),
            });
        }
        self.entries
            .entry(key)
            .or_insert_with(|| TypeEntry::new(name.to_string()))
            .name = name.to_string();
        self.bases.insert(
            key,
            BaseEntry {
                name: name.to_string(),
                kind,
                runtime_key: Box::new(move |value: &dyn Any| {
                    value.downcast_ref::<B>().map(&runtime_key)
                }),
                subtypes: Vec::new(),
                subtype_index: HashMap::new(),
            },
        );
        Ok(())
    }

    pub fn add_type(&mut self, node: TypeNode) -> Result<(), ProtocolError> {
        self.check_unlocked()?;
        if self.bases.contains_key(&node.key)
            || self
                .entries
                .get(&node.key)
                .is_some_and(|entry| entry.parent.is_some() || !entry.interfaces.is_empty())
        {
            return Err(ProtocolError::DuplicateType { name: node.name });
        }
        let entry = self
            .entries
            .entry(node.key)
            .or_insert_with(|| TypeEntry::new(node.name.clone()));
        entry.name = node.name;
        entry.parent = node.parent;
        entry.interfaces = node.interfaces;
        if node.constructor.is_some() {
            entry.constructor = node.constructor;
        }
        Ok(())
    }

    /// Freezes the registry: validates the type tree, builds every base's
    /// subtype array and caches the candidate chain of every
    /// (base, runtime type) pair.
    pub fn lock(&mut self) -> Result<(), ProtocolError> {
        self.check_unlocked()?;

        for entry in self.entries.values() {
            for link in entry.parent.iter().chain(entry.interfaces.iter()) {
                if !self.entries.contains_key(link) {
                    return Err(ProtocolError::UnknownParentType {
                        name: entry.name.clone(),
                        parent: link.name().to_string(),
                    });
                }
            }
        }

        let base_keys: Vec<TypeKey> = self.bases.keys().copied().collect();
        for base_key in base_keys {
            let mut subtypes: Vec<(String, TypeKey)> = self
                .entries
                .iter()
                .filter(|(key, entry)| {
                    entry.constructor.is_some() && self.is_assignable(**key, base_key)
                })
                .map(|(key, entry)| (entry.name.clone(), *key))
                .collect();
            subtypes.sort_by(|a, b| a.0.cmp(&b.0));
            if let Some(pair) = subtypes.windows(2).find(|pair| pair[0].0 == pair[1].0) {
                return Err(ProtocolError::DuplicateType {
                    name: pair[0].0.clone(),
                });
            }

            if subtypes.len() > usize::from(u16::MAX) {
                return Err(ProtocolError::TooManySubtypes {
                    base: base_key.name().to_string(),
                });
            }

            let kind = self.bases[&base_key].kind;
            for (_, runtime) in &subtypes {
                let chain = self.candidate_chain(base_key, kind, *runtime);
                self.candidates.insert((base_key, *runtime), chain);
            }

            let Some(base) = self.bases.get_mut(&base_key) else {
                continue;
            };
            base.subtypes = subtypes.iter().map(|(_, key)| *key).collect();
            base.subtype_index = base
                .subtypes
                .iter()
                .enumerate()
                .map(|(index, key)| (*key, index as u16))
                .collect();
            info!(
                "Base {} locked with {} subtypes",
                base.name,
                base.subtypes.len()
            );
        }

        self.locked = true;
        Ok(())
    }

    fn supertypes(&self, key: TypeKey) -> impl Iterator<Item = TypeKey> + '_ {
        self.entries
            .get(&key)
            .into_iter()
            .flat_map(|entry| entry.parent.iter().chain(entry.interfaces.iter()).copied())
    }

    /// Whether `key` is `base` or reaches it through parents or interfaces.
    pub fn is_assignable(&self, key: TypeKey, base: TypeKey) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if current == base {
                return true;
            }
            if visited.insert(current) {
                stack.extend(self.supertypes(current));
            }
        }
        false
    }

    // Most specific first: the runtime type, then each class ancestor. For
    // interface bases every class in the chain is followed by its
    // interfaces, breadth first.
    fn candidate_chain(&self, base: TypeKey, kind: BaseKind, runtime: TypeKey) -> Vec<TypeKey> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut class = Some(runtime);

        while let Some(current) = class {
            if !visited.insert(current) {
                break;
            }
            self.push_candidate(&mut chain, base, current);

            if kind == BaseKind::Interface {
                let mut queue: VecDeque<TypeKey> = self
                    .entries
                    .get(&current)
                    .map(|entry| entry.interfaces.iter().copied().collect())
                    .unwrap_or_default();
                while let Some(interface) = queue.pop_front() {
                    if !visited.insert(interface) {
                        continue;
                    }
                    self.push_candidate(&mut chain, base, interface);
                    queue.extend(self.supertypes(interface));
                }
            }

            if current == base {
                break;
            }
            class = self.entries.get(&current).and_then(|entry| entry.parent);
        }
        chain
    }

    fn push_candidate(&self, chain: &mut Vec<TypeKey>, base: TypeKey, key: TypeKey) {
        let has_workers = self
            .entries
            .get(&key)
            .is_some_and(|entry| !entry.workers.is_empty());
        if has_workers && self.is_assignable(key, base) {
            chain.push(key);
        }
    }

    /// The stable subtype array of a base, in wire index order.
    pub fn subtypes_of<B: ?Sized + 'static>(&self) -> Option<&[TypeKey]> {
        self.bases
            .get(&TypeKey::of::<B>())
            .map(|base| base.subtypes.as_slice())
    }

    pub fn is_base(&self, key: TypeKey) -> bool {
        self.bases.contains_key(&key)
    }

    pub fn has_entry(&self, key: TypeKey) -> bool {
        self.entries
            .get(&key)
            .is_some_and(|entry| !entry.workers.is_empty())
            || self.bases.contains_key(&key)
    }

    fn no_encoder(key: TypeKey) -> SerializationError {
        SerializationError::NoEncoderForType {
            type_name: key.name().to_string(),
        }
    }

    pub(crate) fn write_dispatch(
        &self,
        key: TypeKey,
        value: &dyn Any,
        ctx: &mut WriteContext<'_, W>,
    ) -> Result<(), SerializationError> {
        if let Some(base) = self.bases.get(&key) {
            return self.write_implicit(key, base, value, ctx);
        }
        let Some(entry) = self.entries.get(&key) else {
            return Err(Self::no_encoder(key));
        };
        if Self::try_write_entry(entry, value, ctx)? {
            Ok(())
        } else {
            Err(Self::no_encoder(key))
        }
    }

    fn write_implicit(
        &self,
        key: TypeKey,
        base: &BaseEntry,
        value: &dyn Any,
        ctx: &mut WriteContext<'_, W>,
    ) -> Result<(), SerializationError> {
        let runtime = (base.runtime_key)(value).ok_or_else(|| SerializationError::TypeMismatch {
            type_name: key.name().to_string(),
        })?;
        let Some(index) = base.subtype_index.get(&runtime) else {
            return Err(Self::no_encoder(runtime));
        };
        ctx.write(index)?;

        for node in self.candidates.get(&(key, runtime)).into_iter().flatten() {
            if let Some(entry) = self.entries.get(node) {
                if Self::try_write_entry(entry, value, ctx)? {
                    return Ok(());
                }
                debug!("Workers of {} declined a {}", entry.name, runtime.name());
            }
        }
        Err(Self::no_encoder(runtime))
    }

    fn try_write_entry(
        entry: &TypeEntry<W>,
        value: &dyn Any,
        ctx: &mut WriteContext<'_, W>,
    ) -> Result<bool, SerializationError> {
        let mark = ctx.writer().bytes_written();
        for worker in entry.workers.iter().rev() {
            match worker.write(value, ctx)? {
                WorkerResult::Handled => return Ok(true),
                WorkerResult::Declined => ctx.writer().truncate(mark),
            }
        }
        Ok(false)
    }

    pub(crate) fn read_dispatch(
        &self,
        key: TypeKey,
        ctx: &mut ReadContext<'_, '_, W>,
    ) -> Result<Value, SerializationError> {
        if let Some(base) = self.bases.get(&key) {
            let index: u16 = ctx.read()?;
            let Some(runtime) = base.subtypes.get(usize::from(index)) else {
                return Err(SerializationError::UnknownSubtype {
                    base: base.name.clone(),
                    index,
                });
            };
            let Some(runtime_entry) = self.entries.get(runtime) else {
                return Err(Self::no_encoder(*runtime));
            };
            for node in self.candidates.get(&(key, *runtime)).into_iter().flatten() {
                if let Some(entry) = self.entries.get(node) {
                    if let Some(value) = Self::try_read_entry(entry, runtime_entry, ctx)? {
                        return Ok(value);
                    }
                }
            }
            return Err(Self::no_encoder(*runtime));
        }

        let Some(entry) = self.entries.get(&key) else {
            return Err(Self::no_encoder(key));
        };
        match Self::try_read_entry(entry, entry, ctx)? {
            Some(value) => Ok(value),
            None => Err(Self::no_encoder(key)),
        }
    }

    fn try_read_entry(
        entry: &TypeEntry<W>,
        runtime_entry: &TypeEntry<W>,
        ctx: &mut ReadContext<'_, '_, W>,
    ) -> Result<Option<Value>, SerializationError> {
        let mark = ctx.reader().position();
        for worker in entry.workers.iter().rev() {
            let mut slot = runtime_entry.fresh_slot();
            match worker.read(&mut slot, ctx)? {
                WorkerResult::Handled => return Ok(Some(slot)),
                WorkerResult::Declined => ctx.reader().set_position(mark),
            }
        }
        Ok(None)
    }
}
