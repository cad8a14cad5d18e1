use std::any::Any;

use lockstep_serde::{read_sequence_len, write_sequence_len, Blob, ByteReader, ByteWrite, Serde};

use crate::{
    serialization::{
        error::SerializationError,
        references::ObjectGraph,
        registry::TypeRegistry,
        sync_type::{Shape, SyncType},
    },
    types::{MapId, ObjectId},
    value::{Value, ValueRef},
};

/// Everything a worker needs to encode a value of a command.
pub struct WriteContext<'a, W> {
    world: &'a W,
    writer: &'a mut dyn ByteWrite,
    registry: &'a TypeRegistry<W>,
    map: MapId,
    // objects whose container chain is currently being written
    pub(crate) resolving: Vec<ObjectId>,
}

impl<'a, W: ObjectGraph + 'static> WriteContext<'a, W> {
    pub fn new(
        world: &'a W,
        writer: &'a mut dyn ByteWrite,
        registry: &'a TypeRegistry<W>,
        map: MapId,
    ) -> Self {
        Self {
            world,
            writer,
            registry,
            map,
            resolving: Vec::new(),
        }
    }

    pub fn world(&self) -> &'a W {
        self.world
    }

    pub fn registry(&self) -> &'a TypeRegistry<W> {
        self.registry
    }

    /// The map the command is partitioned on. Live objects are resolved
    /// against it.
    pub fn map(&self) -> MapId {
        self.map
    }

    pub fn writer(&mut self) -> &mut dyn ByteWrite {
        &mut *self.writer
    }

    pub fn write<T: Serde>(&mut self, value: &T) -> Result<(), SerializationError> {
        value.ser(&mut *self.writer)?;
        Ok(())
    }

    /// Encodes a dynamic value according to its declared type.
    pub fn write_value(&mut self, ty: &SyncType, value: ValueRef) -> Result<(), SerializationError> {
        match ty.shape() {
            Shape::Dispatch => {
                let Some(value) = value else {
                    return Err(ty.unexpected_null());
                };
                let registry = self.registry;
                registry.write_dispatch(ty.key(), value, self)
            }
            Shape::Object { id_of, .. } => match value {
                None => self.write_object(None),
                Some(value) => {
                    let id = id_of(value).ok_or_else(|| ty.mismatch())?;
                    self.write_object(Some(id))
                }
            },
            Shape::Enum { to_repr, .. } => {
                let Some(value) = value else {
                    return Err(ty.unexpected_null());
                };
                let repr = to_repr(value).ok_or_else(|| ty.mismatch())?;
                self.write(&repr)
            }
            Shape::List {
                elem, len, item, ..
            } => {
                let Some(value) = value else {
                    write_sequence_len(&mut *self.writer, 0)?;
                    return Ok(());
                };
                let count = len(value).ok_or_else(|| ty.mismatch())?;
                // null elements are skipped, never written as placeholders
                let items: Vec<&dyn Any> = (0..count)
                    .filter_map(|index| item(value, index))
                    .filter(|item| !elem.is_null_value(Some(*item)))
                    .collect();
                write_sequence_len(&mut *self.writer, items.len())?;
                for item in items {
                    self.write_value(elem, Some(item))?;
                }
                Ok(())
            }
            Shape::Nullable { inner, unwrap, .. } => {
                let inner_value = match value {
                    None => None,
                    Some(value) => unwrap(value).ok_or_else(|| ty.mismatch())?,
                };
                match inner_value {
                    Some(inner_value) => {
                        self.write(&true)?;
                        self.write_value(inner, Some(inner_value))
                    }
                    None => self.write(&false),
                }
            }
            Shape::Def {
                name_of, catalog, ..
            } => {
                let name = match value {
                    None => None,
                    Some(value) => name_of(value).ok_or_else(|| ty.mismatch())?,
                };
                let hash = match name {
                    None => 0u16,
                    Some(name) => self
                        .registry
                        .defs()
                        .short_hash_in(*catalog, name)
                        .ok_or_else(|| SerializationError::UnregisteredDef {
                            catalog: catalog.name().to_string(),
                            name: name.to_string(),
                        })?,
                };
                self.write(&hash)
            }
            Shape::Exposed { to_bytes, .. } => {
                let Some(value) = value else {
                    return Err(ty.unexpected_null());
                };
                let bytes = to_bytes(value)
                    .ok_or_else(|| ty.mismatch())?
                    .map_err(|reason| SerializationError::ExposeFailed {
                        type_name: ty.type_name().to_string(),
                        reason,
                    })?;
                self.write(&Blob::new(bytes))
            }
        }
    }
}

/// Everything a worker needs to decode a value of a command.
pub struct ReadContext<'a, 'b, W> {
    world: &'a W,
    reader: &'a mut ByteReader<'b>,
    registry: &'a TypeRegistry<W>,
    map: MapId,
}

impl<'a, 'b, W: ObjectGraph + 'static> ReadContext<'a, 'b, W> {
    pub fn new(
        world: &'a W,
        reader: &'a mut ByteReader<'b>,
        registry: &'a TypeRegistry<W>,
        map: MapId,
    ) -> Self {
        Self {
            world,
            reader,
            registry,
            map,
        }
    }

    pub fn world(&self) -> &'a W {
        self.world
    }

    pub fn registry(&self) -> &'a TypeRegistry<W> {
        self.registry
    }

    pub fn map(&self) -> MapId {
        self.map
    }

    pub fn reader(&mut self) -> &mut ByteReader<'b> {
        &mut *self.reader
    }

    pub fn read<T: Serde>(&mut self) -> Result<T, SerializationError> {
        Ok(T::de(&mut *self.reader)?)
    }

    /// Decodes a dynamic value according to its declared type.
    pub fn read_value(&mut self, ty: &SyncType) -> Result<Value, SerializationError> {
        match ty.shape() {
            Shape::Dispatch => {
                let registry = self.registry;
                registry.read_dispatch(ty.key(), self)
            }
            Shape::Object { from_id, .. } => Ok(match self.read_object()? {
                Some(id) => Value::from_box(from_id(id)),
                None => Value::null(),
            }),
            Shape::Enum { from_repr, .. } => {
                let repr: i32 = self.read()?;
                from_repr(repr)
                    .map(Value::from_box)
                    .ok_or_else(|| ty.mismatch())
            }
            Shape::List { elem, build, .. } => {
                let count = read_sequence_len(&mut *self.reader)?;
                let mut items = Vec::with_capacity(count.min(self.reader.remaining()));
                for _ in 0..count {
                    // elements that no longer resolve are dropped
                    if let Some(item) = self.read_value(elem)?.into_box() {
                        items.push(item);
                    }
                }
                build(items).map(Value::from_box).ok_or_else(|| ty.mismatch())
            }
            Shape::Nullable { inner, wrap, .. } => {
                let inner_value = if self.read::<bool>()? {
                    self.read_value(inner)?.into_box()
                } else {
                    None
                };
                wrap(inner_value)
                    .map(Value::from_box)
                    .ok_or_else(|| ty.mismatch())
            }
            Shape::Def { lookup, .. } => {
                let hash: u16 = self.read()?;
                Ok(Value::from_box(lookup(self.registry.defs(), hash)?))
            }
            Shape::Exposed { from_bytes, .. } => {
                let blob: Blob = self.read()?;
                let value = from_bytes(&blob).map_err(|reason| {
                    SerializationError::ExposeFailed {
                        type_name: ty.type_name().to_string(),
                        reason,
                    }
                })?;
                Ok(Value::from_box(value))
            }
        }
    }
}
