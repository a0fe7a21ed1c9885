use std::any::{Any, type_name};
use std::sync::Arc;

use serde::Deserialize;

use crate::error::InputError;

/// A type-erased, thread-safe container.
pub(crate) type Dynamic = Arc<dyn Any + Send + Sync>;

/// A type-erased value flowing through the task graph.
///
/// Literal arguments and task results are both stored as `Value`s. Cloning is
/// cheap, the payload sits behind an `Arc` and is never copied.
#[derive(Clone)]
pub struct Value {
    data: Dynamic,
    type_name: &'static str,
}

impl Value {
    /// Wraps `value`. Wrapping a `Value` returns it unchanged.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        let boxed: Box<dyn Any + Send + Sync> = Box::new(value);

        match boxed.downcast::<Value>() {
            Ok(value) => *value,
            Err(boxed) => Self {
                data: Arc::from(boxed),
                type_name: type_name::<T>(),
            },
        }
    }

    /// Builds a multi-valued result out of its parts.
    pub fn sequence(items: Vec<Value>) -> Self {
        Self::new(Sequence(items))
    }

    /// The name of the wrapped type, as reported by [`std::any::type_name`].
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.data.is::<T>()
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// Returns the element at `index` of a multi-valued result.
    pub fn index(&self, index: usize) -> Result<&Value, InputError> {
        let sequence = self
            .downcast_ref::<Sequence>()
            .ok_or(InputError::NotASequence {
                found: self.type_name,
            })?;

        sequence.get(index).ok_or(InputError::OutOfRange {
            index,
            len: sequence.len(),
        })
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Value({})", self.type_name)
    }
}

/// The stored form of a result produced by [`SplitDef::run`](crate::SplitDef::run).
#[derive(Clone, Debug, Default)]
pub struct Sequence(pub Vec<Value>);

impl Sequence {
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }
}

/// Types that can be split into the parts of a multi-valued result.
///
/// Implemented for tuples (up to 12 elements), `Vec<T>` and `[T; N]`.
pub trait IntoSequence {
    fn into_sequence(self) -> Vec<Value>;
}

impl<T: Send + Sync + 'static> IntoSequence for Vec<T> {
    fn into_sequence(self) -> Vec<Value> {
        self.into_iter().map(Value::new).collect()
    }
}

impl<T: Send + Sync + 'static, const N: usize> IntoSequence for [T; N] {
    fn into_sequence(self) -> Vec<Value> {
        self.into_iter().map(Value::new).collect()
    }
}

impl IntoSequence for Sequence {
    fn into_sequence(self) -> Vec<Value> {
        self.0
    }
}

macro_rules! impl_sequence {
    ($($T:ident),*) => {
        #[allow(non_snake_case)]
        impl<$($T),*> IntoSequence for ($($T,)*)
        where
            $($T: Send + Sync + 'static),* {
            fn into_sequence(self) -> Vec<Value> {
                let ($($T,)*) = self;
                vec![$(Value::new($T),)*]
            }
        }
    };
}

impl_sequence!(A);
impl_sequence!(A, B);
impl_sequence!(A, B, C);
impl_sequence!(A, B, C, D);
impl_sequence!(A, B, C, D, E);
impl_sequence!(A, B, C, D, E, F);
impl_sequence!(A, B, C, D, E, F, G);
impl_sequence!(A, B, C, D, E, F, G, H);
impl_sequence!(A, B, C, D, E, F, G, H, I);
impl_sequence!(A, B, C, D, E, F, G, H, I, J);
impl_sequence!(A, B, C, D, E, F, G, H, I, J, K);
impl_sequence!(A, B, C, D, E, F, G, H, I, J, K, L);

/// Scheduling strategy used by [`WorkflowManager::run`](crate::WorkflowManager::run).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    /// A task is submitted the moment its last dependency completes.
    #[default]
    Eager,
    /// Ready tasks are submitted together and joined before the next wave is
    /// computed.
    Waves,
}

/// Run-phase configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    /// The scheduling strategy.
    pub schedule: Schedule,
    /// Size of a dedicated worker pool. `None` uses the global rayon pool,
    /// which is sized by the host.
    pub threads: Option<usize>,
}
