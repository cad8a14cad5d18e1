use std::any::{type_name, Any};

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    serialization::{
        defs::{CatalogEntry, DefCatalog},
        error::SerializationError,
        references::LiveObject,
        type_key::TypeKey,
    },
    types::ObjectId,
    value::ValueRef,
};

/// An enumeration that travels as its underlying `i32` value.
pub trait SyncEnum: Copy + 'static {
    fn to_repr(self) -> i32;

    fn from_repr(repr: i32) -> Option<Self>;
}

/// Declared type of a synced slot: a field value, a target, an argument or a
/// captured variable.
///
/// Most types go through the dispatch registry. Enumerations, lists,
/// nullable wrappers, live objects, defs and exposed values have a fixed
/// wire shape and bypass it.
#[derive(Clone)]
pub struct SyncType {
    key: TypeKey,
    shape: Shape,
}

#[derive(Clone)]
pub(crate) enum Shape {
    Dispatch,
    Object {
        id_of: fn(&dyn Any) -> Option<ObjectId>,
        from_id: fn(ObjectId) -> Box<dyn Any>,
    },
    Enum {
        to_repr: fn(&dyn Any) -> Option<i32>,
        from_repr: fn(i32) -> Option<Box<dyn Any>>,
    },
    List {
        elem: Box<SyncType>,
        len: fn(&dyn Any) -> Option<usize>,
        item: fn(&dyn Any, usize) -> Option<&dyn Any>,
        build: fn(Vec<Box<dyn Any>>) -> Option<Box<dyn Any>>,
    },
    Nullable {
        inner: Box<SyncType>,
        unwrap: fn(&dyn Any) -> Option<Option<&dyn Any>>,
        wrap: fn(Option<Box<dyn Any>>) -> Option<Box<dyn Any>>,
    },
    Def {
        name_of: fn(&dyn Any) -> Option<Option<&str>>,
        lookup: fn(&DefCatalog, u16) -> Result<Box<dyn Any>, SerializationError>,
        catalog: TypeKey,
    },
    Exposed {
        to_bytes: fn(&dyn Any) -> Option<Result<Vec<u8>, String>>,
        from_bytes: fn(&[u8]) -> Result<Box<dyn Any>, String>,
    },
}

impl SyncType {
    /// A type resolved through the dispatch registry.
    pub fn of<T: 'static>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            shape: Shape::Dispatch,
        }
    }

    /// A live object, written as a reference instead of by value.
    pub fn object<R: LiveObject>() -> Self {
        Self {
            key: TypeKey::of::<R>(),
            shape: Shape::Object {
                id_of: object_id_of::<R>,
                from_id: object_from_id::<R>,
            },
        }
    }

    pub fn enumeration<E: SyncEnum>() -> Self {
        Self {
            key: TypeKey::of::<E>(),
            shape: Shape::Enum {
                to_repr: enum_to_repr::<E>,
                from_repr: enum_from_repr::<E>,
            },
        }
    }

    /// A `Vec<T>` whose elements have type `elem`.
    pub fn list<T: 'static>(elem: SyncType) -> Self {
        Self {
            key: TypeKey::of::<Vec<T>>(),
            shape: Shape::List {
                elem: Box::new(elem),
                len: list_len::<T>,
                item: list_item::<T>,
                build: list_build::<T>,
            },
        }
    }

    /// An `Option<T>` whose inner value has type `inner`.
    pub fn nullable<T: 'static>(inner: SyncType) -> Self {
        Self {
            key: TypeKey::of::<Option<T>>(),
            shape: Shape::Nullable {
                inner: Box::new(inner),
                unwrap: nullable_unwrap::<T>,
                wrap: nullable_wrap::<T>,
            },
        }
    }

    /// An `Option<D>` referring to an entry of the def catalog.
    pub fn def<D: CatalogEntry>() -> Self {
        Self {
            key: TypeKey::of::<Option<D>>(),
            shape: Shape::Def {
                name_of: def_name_of::<D>,
                lookup: def_lookup::<D>,
                catalog: TypeKey::of::<D>(),
            },
        }
    }

    /// A value persisted through the exposable serializer and carried as a blob.
    pub fn exposed<T: Serialize + DeserializeOwned + 'static>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            shape: Shape::Exposed {
                to_bytes: exposed_to_bytes::<T>,
                from_bytes: exposed_from_bytes::<T>,
            },
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn type_name(&self) -> &'static str {
        self.key.name()
    }

    pub(crate) fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn is_object(&self) -> bool {
        matches!(self.shape, Shape::Object { .. })
    }

    /// True for a null value, and for an `Option` holding `None`.
    pub fn is_null_value(&self, value: ValueRef) -> bool {
        let Some(value) = value else {
            return true;
        };
        match &self.shape {
            Shape::Nullable { unwrap, .. } => matches!(unwrap(value), Some(None)),
            Shape::Def { name_of, .. } => matches!(name_of(value), Some(None)),
            _ => false,
        }
    }

    /// The object id behind a live object value, looking through one
    /// nullable wrapper.
    pub fn object_id(&self, value: ValueRef) -> Option<ObjectId> {
        let value = value?;
        match &self.shape {
            Shape::Object { id_of, .. } => id_of(value),
            Shape::Nullable { inner, unwrap, .. } => inner.object_id(unwrap(value)?),
            _ => None,
        }
    }

    pub(crate) fn mismatch(&self) -> SerializationError {
        SerializationError::TypeMismatch {
            type_name: self.type_name().to_string(),
        }
    }

    pub(crate) fn unexpected_null(&self) -> SerializationError {
        SerializationError::UnexpectedNull {
            type_name: self.type_name().to_string(),
        }
    }
}

impl std::fmt::Debug for SyncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SyncType({})", self.key.name())
    }
}

fn object_id_of<R: LiveObject>(value: &dyn Any) -> Option<ObjectId> {
    value.downcast_ref::<R>().map(LiveObject::object_id)
}

fn object_from_id<R: LiveObject>(id: ObjectId) -> Box<dyn Any> {
    Box::new(R::from_object_id(id))
}

fn enum_to_repr<E: SyncEnum>(value: &dyn Any) -> Option<i32> {
    value.downcast_ref::<E>().map(|value| value.to_repr())
}

fn enum_from_repr<E: SyncEnum>(repr: i32) -> Option<Box<dyn Any>> {
    E::from_repr(repr).map(|value| Box::new(value) as Box<dyn Any>)
}

fn list_len<T: 'static>(value: &dyn Any) -> Option<usize> {
    value.downcast_ref::<Vec<T>>().map(Vec::len)
}

fn list_item<T: 'static>(value: &dyn Any, index: usize) -> Option<&dyn Any> {
    value
        .downcast_ref::<Vec<T>>()?
        .get(index)
        .map(|item| item as &dyn Any)
}

fn list_build<T: 'static>(items: Vec<Box<dyn Any>>) -> Option<Box<dyn Any>> {
    let mut output: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        output.push(*item.downcast::<T>().ok()?);
    }
    Some(Box::new(output))
}

fn nullable_unwrap<T: 'static>(value: &dyn Any) -> Option<Option<&dyn Any>> {
    value
        .downcast_ref::<Option<T>>()
        .map(|inner| inner.as_ref().map(|inner| inner as &dyn Any))
}

fn nullable_wrap<T: 'static>(inner: Option<Box<dyn Any>>) -> Option<Box<dyn Any>> {
    let wrapped: Option<T> = match inner {
        Some(inner) => Some(*inner.downcast::<T>().ok()?),
        None => None,
    };
    Some(Box::new(wrapped))
}

fn def_name_of<D: CatalogEntry>(value: &dyn Any) -> Option<Option<&str>> {
    value
        .downcast_ref::<Option<D>>()
        .map(|def| def.as_ref().map(CatalogEntry::def_name))
}

fn def_lookup<D: CatalogEntry>(
    catalog: &DefCatalog,
    hash: u16,
) -> Result<Box<dyn Any>, SerializationError> {
    if hash == 0 {
        return Ok(Box::new(None::<D>));
    }
    match catalog.get::<D>(hash) {
        Some(def) => Ok(Box::new(Some(def.clone()))),
        None => Err(SerializationError::UnknownCatalogEntry {
            catalog: type_name::<D>().to_string(),
            hash,
        }),
    }
}

fn exposed_to_bytes<T: Serialize + 'static>(value: &dyn Any) -> Option<Result<Vec<u8>, String>> {
    let value = value.downcast_ref::<T>()?;
    Some(serde_json::to_vec(value).map_err(|err| err.to_string()))
}

fn exposed_from_bytes<T: DeserializeOwned + 'static>(bytes: &[u8]) -> Result<Box<dyn Any>, String> {
    serde_json::from_slice::<T>(bytes)
        .map(|value| Box::new(value) as Box<dyn Any>)
        .map_err(|err| err.to_string())
}
