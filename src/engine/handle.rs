use petgraph::graph::NodeIndex;

use crate::core::{Sequence, Value};
use crate::error::InputError;

/// Things that can be used to read a result out of the graph.
pub trait Handle: Copy + Send + Sync {
    /// The node whose completion this handle observes.
    fn index(&self) -> NodeIndex;

    /// Selects the part of the node's result this handle refers to.
    fn project<'a>(&self, output: &'a Value) -> Result<&'a Value, InputError>;
}

/// A reference to a task in the workflow graph.
///
/// A `Task` is a lightweight, copyable token that represents the future result
/// of a callable. Passing it as an argument to a later task is what declares a
/// dependency: the scheduler guarantees that this task completes before any
/// task that received it runs.
///
/// # Diamond Dependencies
///
/// If Task C and Task B both depend on Task A, and Task D depends on both B and
/// C, Task A is executed *once* and its result is shared.
///
/// # Multiple outputs
///
/// A task declared with `num_output = k` can be iterated, yielding `k`
/// [`SubTask`]s before it has run:
///
/// ```rust
/// use taskwave::WorkflowManager;
///
/// let (mut wm, sum) = WorkflowManager::declare(|wm| {
///     let pair = wm.task().outputs(2).run(|_| Ok((4, 5)));
///     let mut parts = pair.into_iter();
///     let (a, b) = (parts.next().unwrap(), parts.next().unwrap());
///     wm.task()
///         .arg(a)
///         .arg(b)
///         .run(|inputs| Ok(inputs.get::<i32>(0)? + inputs.get::<i32>(1)?))
/// });
///
/// wm.run().unwrap();
/// assert_eq!(wm.get::<i32>(&sum).unwrap(), &9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Task {
    pub(crate) index: NodeIndex,
    pub(crate) num_output: usize,
}

impl Task {
    pub(crate) fn new(index: NodeIndex, num_output: usize) -> Self {
        Self { index, num_output }
    }

    /// Returns the underlying `NodeIndex` of the task in the graph.
    pub fn index(&self) -> NodeIndex {
        self.index
    }

    /// Number of sub-handles produced by iterating this task.
    pub fn num_output(&self) -> usize {
        self.num_output
    }

    /// A handle to element `index` of this task's result. The index is not
    /// checked until the value is read.
    pub fn output(&self, index: usize) -> SubTask {
        SubTask { owner: *self, index }
    }
}

impl Handle for Task {
    fn index(&self) -> NodeIndex {
        self.index
    }

    fn project<'a>(&self, output: &'a Value) -> Result<&'a Value, InputError> {
        Ok(output)
    }
}

impl IntoIterator for Task {
    type Item = SubTask;
    type IntoIter = SubTasks;

    fn into_iter(self) -> Self::IntoIter {
        SubTasks {
            owner: self,
            next: 0,
        }
    }
}

/// Iterator over the sub-handles of a [`Task`].
#[derive(Debug, Clone)]
pub struct SubTasks {
    owner: Task,
    next: usize,
}

impl Iterator for SubTasks {
    type Item = SubTask;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.owner.num_output {
            return None;
        }

        let item = self.owner.output(self.next);
        self.next += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.owner.num_output.saturating_sub(self.next);
        (left, Some(left))
    }
}

impl ExactSizeIterator for SubTasks {}

/// A read-only view of one element of a multi-valued task result.
///
/// It owns no storage. It is done exactly when its owner is done, and wherever
/// it is passed as an argument the owner becomes the real dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubTask {
    owner: Task,
    index: usize,
}

impl SubTask {
    pub fn owner(&self) -> Task {
        self.owner
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl Handle for SubTask {
    fn index(&self) -> NodeIndex {
        self.owner.index
    }

    /// A result that is not a [`Sequence`] counts as a single element.
    fn project<'a>(&self, output: &'a Value) -> Result<&'a Value, InputError> {
        match output.is::<Sequence>() {
            true => output.index(self.index),
            false if self.index == 0 => Ok(output),
            false => Err(InputError::OutOfRange {
                index: self.index,
                len: 1,
            }),
        }
    }
}

/// A single argument slot of a task.
#[derive(Debug, Clone)]
pub enum Arg {
    /// Passed to the callable unchanged.
    Literal(Value),
    /// Replaced by the task's result.
    Task(Task),
    /// Replaced by one element of the owner's result.
    SubTask(SubTask),
}

impl Arg {
    /// The node this slot waits for, if any.
    pub fn dependency(&self) -> Option<NodeIndex> {
        match self {
            Arg::Literal(_) => None,
            Arg::Task(task) => Some(task.index),
            Arg::SubTask(sub) => Some(sub.owner.index),
        }
    }
}

/// Conversion into an argument slot.
pub trait IntoArg {
    fn into_arg(self) -> Arg;
}

impl IntoArg for Arg {
    fn into_arg(self) -> Arg {
        self
    }
}

impl IntoArg for Task {
    fn into_arg(self) -> Arg {
        Arg::Task(self)
    }
}

impl IntoArg for &Task {
    fn into_arg(self) -> Arg {
        Arg::Task(*self)
    }
}

impl IntoArg for SubTask {
    fn into_arg(self) -> Arg {
        Arg::SubTask(self)
    }
}

impl IntoArg for &SubTask {
    fn into_arg(self) -> Arg {
        Arg::SubTask(*self)
    }
}

impl IntoArg for Value {
    fn into_arg(self) -> Arg {
        Arg::Literal(self)
    }
}
