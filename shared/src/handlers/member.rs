use std::any::Any;

use crate::{
    protocol::ProtocolError,
    value::{Value, ValueOps, ValueRef},
};

/// Typed access to one member of the simulation, keyed by a stable dotted
/// path such as `Pawn.drafted` or `Pawn.skills[].level`.
///
/// The path is the member's identity on the wire contract, the closures
/// behind it are only ever local.
pub trait MemberAccess<W>: 'static {
    fn path(&self) -> &str;

    fn is_indexed(&self) -> bool;

    /// Reads the member. `None` when the target or index no longer resolves.
    fn get(&self, world: &W, target: ValueRef, index: ValueRef) -> Option<Value>;

    /// Writes the member. Returns `false` when nothing was written.
    fn set(&self, world: &mut W, target: ValueRef, index: ValueRef, value: Value) -> bool;

    fn value_ops(&self) -> ValueOps;

    fn target_ops(&self) -> ValueOps;

    fn index_ops(&self) -> ValueOps;
}

/// Checks that a member path is a dotted list of identifiers with at most one
/// `[]` indexing level, present exactly when the member is indexed.
pub fn validate_member_path(path: &str, indexed: bool) -> Result<(), ProtocolError> {
    let invalid = |reason: &str| ProtocolError::InvalidMemberPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.is_empty() {
        return Err(invalid("path is empty"));
    }

    let mut index_levels = 0;
    for segment in path.split('.') {
        let name = match segment.strip_suffix("[]") {
            Some(name) => {
                index_levels += 1;
                name
            }
            None => segment,
        };
        if name.is_empty() {
            return Err(invalid("empty segment"));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid("segments may only contain letters, digits and `_`"));
        }
    }

    match (index_levels, indexed) {
        (0, false) | (1, true) => Ok(()),
        (0, true) => Err(invalid("indexed member needs a `[]` segment")),
        (1, false) => Err(invalid("`[]` segment on a member without an index type")),
        _ => Err(invalid("only one `[]` indexing level is supported")),
    }
}

type Getter<W, T, V> = Box<dyn Fn(&W, &T) -> Option<V>>;
type Setter<W, T, V> = Box<dyn Fn(&mut W, &T, V) -> bool>;

/// Member of a target object.
pub struct FieldAccessor<W, T, V> {
    path: String,
    get: Getter<W, T, V>,
    set: Setter<W, T, V>,
}

impl<W, T, V> FieldAccessor<W, T, V> {
    pub fn new(
        path: &str,
        get: impl Fn(&W, &T) -> Option<V> + 'static,
        set: impl Fn(&mut W, &T, V) -> bool + 'static,
    ) -> Self {
        Self {
            path: path.to_string(),
            get: Box::new(get),
            set: Box::new(set),
        }
    }
}

impl<W, T, V> MemberAccess<W> for FieldAccessor<W, T, V>
where
    W: 'static,
    T: Any + Clone + PartialEq,
    V: Any + Clone + PartialEq,
{
    fn path(&self) -> &str {
        &self.path
    }

    fn is_indexed(&self) -> bool {
        false
    }

    fn get(&self, world: &W, target: ValueRef, _index: ValueRef) -> Option<Value> {
        let target = target?.downcast_ref::<T>()?;
        (self.get)(world, target).map(Value::new)
    }

    fn set(&self, world: &mut W, target: ValueRef, _index: ValueRef, mut value: Value) -> bool {
        let (Some(target), Some(value)) = (
            target.and_then(|target| target.downcast_ref::<T>()),
            value.take::<V>(),
        ) else {
            return false;
        };
        (self.set)(world, target, value)
    }

    fn value_ops(&self) -> ValueOps {
        ValueOps::of::<V>()
    }

    fn target_ops(&self) -> ValueOps {
        ValueOps::of::<T>()
    }

    fn index_ops(&self) -> ValueOps {
        ValueOps::none()
    }
}

/// Process-wide member with no target, such as a settings value.
pub struct GlobalFieldAccessor<W, V> {
    path: String,
    get: Box<dyn Fn(&W) -> V>,
    set: Box<dyn Fn(&mut W, V)>,
}

impl<W, V> GlobalFieldAccessor<W, V> {
    pub fn new(
        path: &str,
        get: impl Fn(&W) -> V + 'static,
        set: impl Fn(&mut W, V) + 'static,
    ) -> Self {
        Self {
            path: path.to_string(),
            get: Box::new(get),
            set: Box::new(set),
        }
    }
}

impl<W, V> MemberAccess<W> for GlobalFieldAccessor<W, V>
where
    W: 'static,
    V: Any + Clone + PartialEq,
{
    fn path(&self) -> &str {
        &self.path
    }

    fn is_indexed(&self) -> bool {
        false
    }

    fn get(&self, world: &W, _target: ValueRef, _index: ValueRef) -> Option<Value> {
        Some(Value::new((self.get)(world)))
    }

    fn set(&self, world: &mut W, _target: ValueRef, _index: ValueRef, mut value: Value) -> bool {
        let Some(value) = value.take::<V>() else {
            return false;
        };
        (self.set)(world, value);
        true
    }

    fn value_ops(&self) -> ValueOps {
        ValueOps::of::<V>()
    }

    fn target_ops(&self) -> ValueOps {
        ValueOps::none()
    }

    fn index_ops(&self) -> ValueOps {
        ValueOps::none()
    }
}

type IndexedGetter<W, T, I, V> = Box<dyn Fn(&W, &T, &I) -> Option<V>>;
type IndexedSetter<W, T, I, V> = Box<dyn Fn(&mut W, &T, &I, V) -> bool>;

/// Member reached through one indexing level, e.g. one skill of a pawn.
pub struct IndexedFieldAccessor<W, T, I, V> {
    path: String,
    get: IndexedGetter<W, T, I, V>,
    set: IndexedSetter<W, T, I, V>,
}

impl<W, T, I, V> IndexedFieldAccessor<W, T, I, V> {
    pub fn new(
        path: &str,
        get: impl Fn(&W, &T, &I) -> Option<V> + 'static,
        set: impl Fn(&mut W, &T, &I, V) -> bool + 'static,
    ) -> Self {
        Self {
            path: path.to_string(),
            get: Box::new(get),
            set: Box::new(set),
        }
    }
}

impl<W, T, I, V> MemberAccess<W> for IndexedFieldAccessor<W, T, I, V>
where
    W: 'static,
    T: Any + Clone + PartialEq,
    I: Any + Clone + PartialEq,
    V: Any + Clone + PartialEq,
{
    fn path(&self) -> &str {
        &self.path
    }

    fn is_indexed(&self) -> bool {
        true
    }

    fn get(&self, world: &W, target: ValueRef, index: ValueRef) -> Option<Value> {
        let target = target?.downcast_ref::<T>()?;
        let index = index?.downcast_ref::<I>()?;
        (self.get)(world, target, index).map(Value::new)
    }

    fn set(&self, world: &mut W, target: ValueRef, index: ValueRef, mut value: Value) -> bool {
        let (Some(target), Some(index), Some(value)) = (
            target.and_then(|target| target.downcast_ref::<T>()),
            index.and_then(|index| index.downcast_ref::<I>()),
            value.take::<V>(),
        ) else {
            return false;
        };
        (self.set)(world, target, index, value)
    }

    fn value_ops(&self) -> ValueOps {
        ValueOps::of::<V>()
    }

    fn target_ops(&self) -> ValueOps {
        ValueOps::of::<T>()
    }

    fn index_ops(&self) -> ValueOps {
        ValueOps::of::<I>()
    }
}
