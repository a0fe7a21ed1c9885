mod handle;
mod node;
pub(crate) mod runner;

use std::any::type_name;
use std::collections::BTreeMap;

pub use crate::engine::handle::{Arg, Handle, IntoArg, SubTask, SubTasks, Task};
pub(crate) use crate::engine::node::{Callable, Kind, TaskNode};
pub use crate::engine::runner::{Diagnostics, Mermaid, TaskExecution};

use crate::core::Value;
use crate::error::InputError;

/// The resolved arguments handed to a callable.
///
/// Every slot that referenced a [`Task`] or a [`SubTask`] at declaration time
/// now holds that task's result; literal slots are passed through unchanged.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    positional: Vec<Value>,
    named: BTreeMap<String, Value>,
}

impl Inputs {
    pub(crate) fn new(positional: Vec<Value>, named: BTreeMap<String, Value>) -> Self {
        Self { positional, named }
    }

    /// Number of positional arguments.
    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    pub fn value(&self, index: usize) -> Result<&Value, InputError> {
        self.positional
            .get(index)
            .ok_or(InputError::MissingPositional(index))
    }

    pub fn named_value(&self, key: &str) -> Result<&Value, InputError> {
        self.named
            .get(key)
            .ok_or_else(|| InputError::MissingNamed(key.to_string()))
    }

    /// Positional argument `index`, downcast to `T`.
    pub fn get<T: 'static>(&self, index: usize) -> Result<&T, InputError> {
        downcast(self.value(index)?, || index.to_string())
    }

    /// Named argument `key`, downcast to `T`.
    pub fn named<T: 'static>(&self, key: &str) -> Result<&T, InputError> {
        downcast(self.named_value(key)?, || key.to_string())
    }

    /// Iterates over the positional arguments in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.positional.iter()
    }

    /// Iterates over the named arguments, sorted by key.
    pub fn iter_named(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.named.iter().map(|(key, value)| (key.as_str(), value))
    }
}

fn downcast<T: 'static>(value: &Value, slot: impl FnOnce() -> String) -> Result<&T, InputError> {
    value
        .downcast_ref::<T>()
        .ok_or_else(|| InputError::TypeMismatch {
            slot: slot(),
            expected: type_name::<T>(),
            found: value.type_name(),
        })
}
