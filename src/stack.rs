//! Generic argument stack: the boxed calling convention.
//!
//! Boxed kernels receive their arguments as a suffix of a [`Stack`] of
//! type-erased [`Value`]s, pushed in declaration order, and must leave
//! exactly one value (the result) or none (for unit returns) when they
//! finish. The arity checks live in [`crate::adapters`]; this module only
//! provides the container.

use std::any::{type_name, Any};
use std::fmt;

use thiserror::Error;

/// Error produced when a [`Value`] is extracted as the wrong type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("expected a stack value of type `{expected}`, found `{actual}`")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

/// A single type-erased value on the argument stack.
pub struct Value {
    inner: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl Value {
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Self {
            inner: Box::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Whether the contained value is a `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Name of the contained type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Extract the contained value, consuming the `Value`.
    pub fn try_take<T: 'static>(self) -> Result<T, ValueError> {
        let actual = self.type_name;
        self.inner
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| ValueError::TypeMismatch {
                expected: type_name::<T>(),
                actual,
            })
    }

    /// Extract the contained value, panicking on a type mismatch.
    ///
    /// A mismatch here means a kernel was registered with one signature and
    /// invoked with another, which is a fatal registration bug.
    pub fn take<T: 'static>(self) -> T {
        self.try_take().unwrap_or_else(|err| panic!("{err}"))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value(<{}>)", self.type_name)
    }
}

/// Ordered sequence of type-erased values.
///
/// Arguments are pushed in declaration order, so the last argument sits on
/// top. A boxed kernel consumes the suffix holding its arguments and pushes
/// its result (if any) back.
#[derive(Debug, Default)]
pub struct Stack {
    values: Vec<Value>,
}

impl Stack {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn push<T: Send + 'static>(&mut self, value: T) {
        self.values.push(Value::new(value));
    }

    pub fn push_value(&mut self, value: Value) {
        self.values.push(value);
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.values.pop()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Remove and return the top `count` values, preserving their order.
    ///
    /// This is how boxed kernels consume their arguments. Panics if the
    /// stack holds fewer than `count` values: the caller pushed fewer
    /// arguments than the kernel's declared arity, which is a fatal
    /// registration/invocation mismatch.
    pub fn split_off_suffix(&mut self, count: usize) -> Vec<Value> {
        if count > self.values.len() {
            panic!(
                "boxed call expects {count} argument(s) but the stack holds only {}",
                self.values.len()
            );
        }
        let at = self.values.len() - count;
        self.values.split_off(at)
    }
}
