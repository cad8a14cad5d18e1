use std::fmt::Debug;

use log::debug;

use crate::{
    protocol::ProtocolError,
    serialization::{
        context::{ReadContext, WriteContext},
        error::SerializationError,
    },
    types::{MapId, ObjectId},
};

/// A handle to a live simulation object, encoded by reference.
pub trait LiveObject: Copy + Debug + 'static {
    fn object_id(&self) -> ObjectId;

    fn from_object_id(id: ObjectId) -> Self;
}

impl LiveObject for ObjectId {
    fn object_id(&self) -> ObjectId {
        *self
    }

    fn from_object_id(id: ObjectId) -> Self {
        id
    }
}

/// A registered kind of storage container. Kind 0 is the ambient map and is
/// never registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerKind(pub u8);

impl ContainerKind {
    pub const AMBIENT_MAP: ContainerKind = ContainerKind(0);
}

/// Where a live object is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Holder {
    /// Directly on a map.
    Map(MapId),
    /// Inside a container owned by another object, e.g. a pawn's inventory.
    Container { kind: ContainerKind, owner: ObjectId },
}

// Guards map_of against holder cycles in a malformed world.
const MAX_HOLDER_DEPTH: usize = 64;

/// The simulation's view of its object graph, as needed by reference encoding.
pub trait ObjectGraph {
    /// The direct holder of a live object, or `None` when it does not exist.
    fn holder_of(&self, id: ObjectId) -> Option<Holder>;

    fn is_held_by(&self, id: ObjectId, holder: &Holder) -> bool {
        self.holder_of(id).as_ref() == Some(holder)
    }

    fn map_exists(&self, map: MapId) -> bool;

    /// The map an object ultimately lives on, following container owners.
    fn map_of(&self, id: ObjectId) -> Option<MapId> {
        let mut current = id;
        for _ in 0..MAX_HOLDER_DEPTH {
            match self.holder_of(current)? {
                Holder::Map(map) => return Some(map),
                Holder::Container { owner, .. } => current = owner,
            }
        }
        None
    }
}

/// Names of the registered container kinds, in registration order.
#[derive(Default)]
pub struct ContainerKinds {
    names: Vec<String>,
}

impl ContainerKinds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a container kind. Kinds are numbered from 1 in registration
    /// order, so every peer must register them identically.
    pub fn add(&mut self, name: &str) -> Result<ContainerKind, ProtocolError> {
        if self.names.iter().any(|existing| existing == name) {
            return Err(ProtocolError::DuplicateType {
                name: name.to_string(),
            });
        }
        if self.names.len() >= usize::from(u8::MAX) {
            return Err(ProtocolError::TooManyContainerKinds);
        }
        self.names.push(name.to_string());
        Ok(ContainerKind(self.names.len() as u8))
    }

    pub fn contains(&self, kind: ContainerKind) -> bool {
        kind.0 > 0 && usize::from(kind.0) <= self.names.len()
    }

    pub fn name(&self, kind: ContainerKind) -> Option<&str> {
        if !self.contains(kind) {
            return None;
        }
        self.names.get(usize::from(kind.0) - 1).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<'a, W: ObjectGraph + 'static> WriteContext<'a, W> {
    /// Writes a live object reference: `[i32 id]`, then for a non-null id the
    /// container chain `[u8 kind]` followed, for kinds above 0, by the owner.
    pub fn write_object(&mut self, id: Option<ObjectId>) -> Result<(), SerializationError> {
        let Some(id) = id else {
            return self.write(&ObjectId::NULL_WIRE);
        };
        self.write(&id.0)?;
        self.write_holder(id)
    }

    fn write_holder(&mut self, id: ObjectId) -> Result<(), SerializationError> {
        let Some(holder) = self.world().holder_of(id) else {
            return Err(SerializationError::UnresolvableContainer { id });
        };

        match holder {
            Holder::Map(map) => {
                if map != self.map() {
                    return Err(SerializationError::PartitionMismatch {
                        id,
                        expected: self.map(),
                        found: map,
                    });
                }
                self.write(&ContainerKind::AMBIENT_MAP.0)
            }
            Holder::Container { kind, owner } => {
                if !self.registry().containers().contains(kind) {
                    return Err(SerializationError::UnknownContainerKind { kind: kind.0 });
                }
                if self.resolving.contains(&owner) || self.resolving.contains(&id) {
                    debug!(
                        "Container chain of {:?} loops back through {:?}, falling back to the ambient map",
                        id, owner
                    );
                    return self.write(&ContainerKind::AMBIENT_MAP.0);
                }

                self.resolving.push(id);
                let result = self
                    .write(&kind.0)
                    .and_then(|()| self.write_object(Some(owner)));
                self.resolving.pop();
                result
            }
        }
    }
}

impl<'a, 'b, W: ObjectGraph + 'static> ReadContext<'a, 'b, W> {
    /// Reads a live object reference. Objects that no longer resolve on this
    /// peer decode to `None`, malformed container chains are errors.
    pub fn read_object(&mut self) -> Result<Option<ObjectId>, SerializationError> {
        let raw: i32 = self.read()?;
        if raw == ObjectId::NULL_WIRE {
            return Ok(None);
        }
        let id = ObjectId(raw);

        let kind = ContainerKind(self.read::<u8>()?);
        if kind == ContainerKind::AMBIENT_MAP {
            if self.world().map_of(id) == Some(self.map()) {
                return Ok(Some(id));
            }
            debug!("Object {:?} no longer exists on map {:?}", id, self.map());
            return Ok(None);
        }

        if !self.registry().containers().contains(kind) {
            return Err(SerializationError::UnknownContainerKind { kind: kind.0 });
        }
        let Some(owner) = self.read_object()? else {
            return Ok(None);
        };
        if self
            .world()
            .is_held_by(id, &Holder::Container { kind, owner })
        {
            Ok(Some(id))
        } else {
            debug!(
                "Object {:?} is no longer held in container {:?} of {:?}",
                id, kind, owner
            );
            Ok(None)
        }
    }
}
