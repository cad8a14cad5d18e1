use std::any::Any;

/// Borrowed view of a possibly-null dynamic value.
pub type ValueRef<'a> = Option<&'a dyn Any>;

/// An owned, dynamically typed value flowing through the command codec.
///
/// `Value::null()` stands for an absent value: a null reference, an object
/// that no longer exists on this peer, or a target-less field.
#[derive(Default)]
pub struct Value(Option<Box<dyn Any>>);

impl Value {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Some(Box::new(value)))
    }

    pub fn from_box(value: Box<dyn Any>) -> Self {
        Self(Some(value))
    }

    pub fn null() -> Self {
        Self(None)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    pub fn as_ref(&self) -> ValueRef<'_> {
        self.0.as_deref()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_ref()?.downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.0.as_mut()?.downcast_mut::<T>()
    }

    /// Moves the inner value out if it has type `T`, leaving the value untouched otherwise.
    pub fn take<T: Any>(&mut self) -> Option<T> {
        if !self.0.as_ref()?.is::<T>() {
            return None;
        }
        let boxed = self.0.take()?;
        boxed.downcast::<T>().ok().map(|value| *value)
    }

    pub fn into_box(self) -> Option<Box<dyn Any>> {
        self.0
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(_) => f.write_str("Value(..)"),
            None => f.write_str("Value(null)"),
        }
    }
}

/// Type-erased equality and cloning for one concrete value type.
///
/// Dynamic values are not `Clone` or `PartialEq`, so every place that keys or
/// compares them (change buffering, watch tokens) carries the operations of
/// the declared type alongside.
#[derive(Clone, Copy)]
pub struct ValueOps {
    eq: fn(ValueRef, ValueRef) -> bool,
    clone: fn(ValueRef) -> Value,
}

impl ValueOps {
    pub fn of<T: Any + Clone + PartialEq>() -> Self {
        Self {
            eq: erased_eq::<T>,
            clone: erased_clone::<T>,
        }
    }

    /// Operations for slots that never hold a value, such as the target of a
    /// process-wide field.
    pub fn none() -> Self {
        Self {
            eq: |a, b| a.is_none() && b.is_none(),
            clone: |_| Value::null(),
        }
    }

    pub fn eq(&self, a: ValueRef, b: ValueRef) -> bool {
        (self.eq)(a, b)
    }

    pub fn clone_value(&self, value: ValueRef) -> Value {
        (self.clone)(value)
    }
}

fn erased_eq<T: Any + PartialEq>(a: ValueRef, b: ValueRef) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => false,
    }
}

fn erased_clone<T: Any + Clone>(value: ValueRef) -> Value {
    match value.and_then(|value| value.downcast_ref::<T>()) {
        Some(value) => Value::new(value.clone()),
        None => Value::null(),
    }
}

/// Positional arguments of a method, delegate or choice invocation.
#[derive(Debug, Default)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Appends an argument.
    pub fn with<T: Any>(mut self, value: T) -> Self {
        self.0.push(Value::new(value));
        self
    }

    pub fn with_null(mut self) -> Self {
        self.0.push(Value::null());
        self
    }

    pub fn push(&mut self, value: Value) {
        self.0.push(value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.0.get(index)?.downcast_ref::<T>()
    }

    pub fn take<T: Any>(&mut self, index: usize) -> Option<T> {
        self.0.get_mut(index)?.take::<T>()
    }

    pub fn value(&self, index: usize) -> ValueRef<'_> {
        self.0.get(index).and_then(Value::as_ref)
    }

    pub fn is_null(&self, index: usize) -> bool {
        self.0.get(index).map_or(true, Value::is_null)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }
}
