use std::any::type_name;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use petgraph::Graph;
use petgraph::graph::NodeIndex;

use crate::core::{IntoSequence, Options, Schedule, Value};
use crate::engine::{Arg, Callable, Diagnostics, Handle, Inputs, IntoArg, Kind, SubTask, Task, TaskNode};
use crate::error::{InputError, WorkflowError};

/// The declaration phase of a workflow.
///
/// `Blueprint` collects tasks into a graph. Dependencies are never declared
/// explicitly: passing a [`Task`] or [`SubTask`] as an argument to a later
/// task is what adds the edge.
///
/// Once declared, seal it with [`Blueprint::finish`] to get a
/// [`WorkflowManager`], which can run the graph but can no longer grow it.
///
/// # Example
///
/// ```rust
/// use taskwave::Blueprint;
///
/// let mut bp = Blueprint::new();
/// let ten = bp.task().name("ten").run(|_| Ok(10));
/// let thirty = bp
///     .task()
///     .name("triple")
///     .arg(ten)
///     .run(|inputs| Ok(inputs.get::<i32>(0)? * 3));
///
/// let mut wm = bp.finish();
/// wm.run().unwrap();
/// assert_eq!(wm.get::<i32>(&thirty).unwrap(), &30);
/// ```
pub struct Blueprint {
    pub(crate) graph: Graph<TaskNode, ()>,
    inputs: Vec<NodeIndex>,
    outputs: Vec<Arg>,
    options: Options,
}

impl Blueprint {
    /// Creates a new, empty blueprint with default [`Options`].
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        Self {
            graph: Graph::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            options,
        }
    }

    pub fn schedule(&mut self, schedule: Schedule) -> &mut Self {
        self.options.schedule = schedule;
        self
    }

    /// Runs the graph on a dedicated pool of `threads` workers instead of the
    /// global one.
    pub fn threads(&mut self, threads: usize) -> &mut Self {
        self.options.threads = Some(threads);
        self
    }

    /// The entry point for declaring a task.
    pub fn task(&mut self) -> TaskDef<'_> {
        TaskDef {
            blueprint: self,
            name: None,
            args: Vec::new(),
            named: BTreeMap::new(),
        }
    }

    /// Declares a workflow input. Its value is supplied to
    /// [`WorkflowManager::run_with`] in declaration order.
    pub fn input(&mut self) -> Task {
        let slot = self.inputs.len();
        let index = self.graph.add_node(TaskNode::input(slot));
        self.inputs.push(index);
        Task::new(index, 1)
    }

    /// Designates a value returned by [`WorkflowManager::call`].
    pub fn output(&mut self, value: impl IntoArg) -> &mut Self {
        self.outputs.push(value.into_arg());
        self
    }

    /// Declares a task whose body is attached later with [`TaskDef::define`].
    ///
    /// This allows tasks declared afterwards to be referenced by it. A
    /// reservation that is never defined can never complete, running the
    /// workflow then fails with [`WorkflowError::GraphNotProgressing`].
    pub fn reserve(&mut self) -> Task {
        let name = format!("reserved#{}", self.graph.node_count());
        Task::new(self.graph.add_node(TaskNode::reserved(name.into())), 1)
    }

    /// Number of declared tasks, inputs and reservations included.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Seals the declaration phase.
    pub fn finish(self) -> WorkflowManager {
        WorkflowManager {
            graph: self.graph,
            inputs: self.inputs,
            outputs: self.outputs,
            options: self.options,
            consumed: false,
        }
    }

    fn add(&mut self, node: TaskNode) -> Task {
        let num_output = node.num_output;
        let dependencies = node.dependencies.clone();
        let index = self.graph.add_node(node);

        for dependency in dependencies {
            self.graph.add_edge(dependency, index, ());
        }

        Task::new(index, num_output)
    }

    fn define(&mut self, task: Task, node: TaskNode) -> Result<Task, WorkflowError> {
        let slot = self
            .graph
            .node_weight_mut(task.index())
            .ok_or(WorkflowError::UnknownTask {
                index: task.index().index(),
            })?;

        if !matches!(slot.kind, Kind::Reserved) {
            return Err(WorkflowError::AlreadyDefined {
                name: slot.name.clone(),
            });
        }

        let num_output = node.num_output;
        let dependencies = node.dependencies.clone();
        *slot = node;

        for dependency in dependencies {
            self.graph.add_edge(dependency, task.index(), ());
        }

        Ok(Task::new(task.index(), num_output))
    }
}

impl Default for Blueprint {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Blueprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        render_dag(&self.graph, f)
    }
}

/// Builder for a single task, created by [`Blueprint::task`].
pub struct TaskDef<'a> {
    blueprint: &'a mut Blueprint,
    name: Option<Cow<'static, str>>,
    args: Vec<Arg>,
    named: BTreeMap<String, Arg>,
}

impl<'a> TaskDef<'a> {
    /// Overrides the task name. Defaults to the type name of the callable.
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Appends a positional argument: a [`Task`], a [`SubTask`], an [`Arg`] or
    /// a [`Value`].
    pub fn arg(mut self, arg: impl IntoArg) -> Self {
        self.args.push(arg.into_arg());
        self
    }

    /// Appends a literal positional argument.
    pub fn literal<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.arg(Value::new(value))
    }

    pub fn named(mut self, key: impl Into<String>, arg: impl IntoArg) -> Self {
        self.named.insert(key.into(), arg.into_arg());
        self
    }

    pub fn named_literal<T: Send + Sync + 'static>(self, key: impl Into<String>, value: T) -> Self {
        self.named(key, Value::new(value))
    }

    /// Declares a multi-valued task with `num_output` parts.
    ///
    /// The callable attached to the returned [`SplitDef`] must produce an
    /// [`IntoSequence`] result, and iterating the resulting [`Task`] yields
    /// `num_output` [`SubTask`]s, one per element.
    pub fn outputs(self, num_output: usize) -> SplitDef<'a> {
        SplitDef {
            def: self,
            num_output,
        }
    }

    /// Attaches a callable whose result is used whole. Iterating the task
    /// yields a single [`SubTask`] reading that result.
    pub fn run<F, R>(self, callback: F) -> Task
    where
        F: Fn(&Inputs) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Send + Sync + 'static,
    {
        let (blueprint, node) = self.into_node::<F>(whole(callback), 1);
        blueprint.add(node)
    }

    /// Like [`SplitDef::run`] with `N` outputs, unpacked right away.
    ///
    /// ```rust
    /// # let mut bp = taskwave::Blueprint::new();
    /// let [quotient, remainder]: [taskwave::SubTask; 2] =
    ///     bp.task().split(|_| Ok((17 / 5, 17 % 5)));
    /// ```
    pub fn split<const N: usize, F, R>(self, callback: F) -> [SubTask; N]
    where
        F: Fn(&Inputs) -> anyhow::Result<R> + Send + Sync + 'static,
        R: IntoSequence,
    {
        let task = self.outputs(N).run(callback);
        std::array::from_fn(|i| task.output(i))
    }

    /// Attaches a callable to a task previously created with
    /// [`Blueprint::reserve`].
    pub fn define<F, R>(self, task: Task, callback: F) -> Result<Task, WorkflowError>
    where
        F: Fn(&Inputs) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Send + Sync + 'static,
    {
        let (blueprint, node) = self.into_node::<F>(whole(callback), 1);
        blueprint.define(task, node)
    }

    fn into_node<F>(self, callable: Callable, num_output: usize) -> (&'a mut Blueprint, TaskNode) {
        let name = self.name.unwrap_or(type_name::<F>().into());
        let node = TaskNode::call(name, callable, self.args, self.named, num_output);
        (self.blueprint, node)
    }
}

/// Builder for a multi-valued task, created by [`TaskDef::outputs`].
///
/// Its result is always stored as a [`Sequence`](crate::Sequence), so every
/// [`SubTask`] of the task indexes into it.
pub struct SplitDef<'a> {
    def: TaskDef<'a>,
    num_output: usize,
}

impl<'a> SplitDef<'a> {
    /// Attaches a callable whose result is split into its elements.
    pub fn run<F, R>(self, callback: F) -> Task
    where
        F: Fn(&Inputs) -> anyhow::Result<R> + Send + Sync + 'static,
        R: IntoSequence,
    {
        let (blueprint, node) = self.def.into_node::<F>(sequence(callback), self.num_output);
        blueprint.add(node)
    }

    /// Attaches a splitting callable to a task previously created with
    /// [`Blueprint::reserve`].
    pub fn define<F, R>(self, task: Task, callback: F) -> Result<Task, WorkflowError>
    where
        F: Fn(&Inputs) -> anyhow::Result<R> + Send + Sync + 'static,
        R: IntoSequence,
    {
        let (blueprint, node) = self.def.into_node::<F>(sequence(callback), self.num_output);
        blueprint.define(task, node)
    }
}

fn whole<F, R>(callback: F) -> Callable
where
    F: Fn(&Inputs) -> anyhow::Result<R> + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    Box::new(move |inputs: &Inputs| callback(inputs).map(Value::new))
}

fn sequence<F, R>(callback: F) -> Callable
where
    F: Fn(&Inputs) -> anyhow::Result<R> + Send + Sync + 'static,
    R: IntoSequence,
{
    Box::new(move |inputs: &Inputs| {
        callback(inputs).map(|output| Value::sequence(output.into_sequence()))
    })
}

/// A sealed workflow, ready to run.
///
/// Obtained from [`Blueprint::finish`] or, in scoped form, from
/// [`WorkflowManager::declare`]. It offers no way to add tasks, so the graph
/// seen by the scheduler is exactly the one that was declared.
pub struct WorkflowManager {
    pub(crate) graph: Graph<TaskNode, ()>,
    inputs: Vec<NodeIndex>,
    outputs: Vec<Arg>,
    options: Options,
    consumed: bool,
}

impl WorkflowManager {
    pub fn design() -> Blueprint {
        Blueprint::default()
    }

    /// Opens a declaration scope. The closure receives the blueprint, and the
    /// workflow is sealed as soon as it returns.
    ///
    /// ```rust
    /// use taskwave::WorkflowManager;
    ///
    /// let (mut wm, result) = WorkflowManager::declare(|wm| {
    ///     let data = wm.task().run(|_| Ok(10));
    ///     wm.task().arg(data).run(|inputs| Ok(inputs.get::<i32>(0)? * 3))
    /// });
    ///
    /// wm.run().unwrap();
    /// assert_eq!(wm.get::<i32>(&result).unwrap(), &30);
    /// ```
    pub fn declare<F, R>(scope: F) -> (Self, R)
    where
        F: FnOnce(&mut Blueprint) -> R,
    {
        Self::declare_with(Options::default(), scope)
    }

    pub fn declare_with<F, R>(options: Options, scope: F) -> (Self, R)
    where
        F: FnOnce(&mut Blueprint) -> R,
    {
        let mut blueprint = Blueprint::with_options(options);
        let out = scope(&mut blueprint);
        (blueprint.finish(), out)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Executes the whole graph once.
    ///
    /// With [`Schedule::Eager`] the calling thread blocks until tasks report
    /// back. Calling this from a worker of the same rayon pool the tasks run
    /// on can therefore deadlock when that pool has a single thread. Set
    /// [`Options::threads`] to run on a dedicated pool when calling from
    /// inside rayon.
    pub fn run(&mut self) -> Result<Diagnostics, WorkflowError> {
        self.run_with(Vec::new())
    }

    /// Executes the whole graph once, filling the declared inputs from
    /// `values` in declaration order.
    pub fn run_with<I>(&mut self, values: I) -> Result<Diagnostics, WorkflowError>
    where
        I: IntoIterator<Item = Value>,
    {
        if self.consumed {
            return Err(WorkflowError::AlreadyRun);
        }

        let values: Vec<Value> = values.into_iter().collect();
        if values.len() != self.inputs.len() {
            return Err(WorkflowError::InputCount {
                expected: self.inputs.len(),
                got: values.len(),
            });
        }

        self.consumed = true;

        for (&index, value) in self.inputs.iter().zip(values) {
            self.graph[index].publish(value)?;
        }

        crate::engine::runner::run(&self.graph, &self.options)
    }

    /// Runs the workflow with `values` as inputs and returns the designated
    /// outputs in declaration order.
    pub fn call<I>(&mut self, values: I) -> Result<Vec<Value>, WorkflowError>
    where
        I: IntoIterator<Item = Value>,
    {
        self.run_with(values)?;

        self.outputs
            .iter()
            .map(|output| match output {
                Arg::Literal(value) => Ok(value.clone()),
                Arg::Task(task) => self.value(task).cloned(),
                Arg::SubTask(sub) => self.value(sub).cloned(),
            })
            .collect()
    }

    pub fn is_done(&self, handle: &impl Handle) -> bool {
        self.graph
            .node_weight(handle.index())
            .is_some_and(TaskNode::is_done)
    }

    /// The name of the task behind `handle`.
    pub fn name(&self, handle: &impl Handle) -> Option<&str> {
        self.graph
            .node_weight(handle.index())
            .map(|node| node.name.as_ref())
    }

    /// Reads the result behind `handle`. Fails with
    /// [`WorkflowError::NotDone`] until the owning task has completed.
    pub fn value(&self, handle: &impl Handle) -> Result<&Value, WorkflowError> {
        let index = handle.index();
        let node = self
            .graph
            .node_weight(index)
            .ok_or(WorkflowError::UnknownTask {
                index: index.index(),
            })?;

        let output = node.result().ok_or_else(|| WorkflowError::NotDone {
            name: node.name.clone(),
        })?;

        Ok(handle.project(output)?)
    }

    /// Reads the result behind `handle`, downcast to `T`.
    pub fn get<T: 'static>(&self, handle: &impl Handle) -> Result<&T, WorkflowError> {
        let value = self.value(handle)?;

        value.downcast_ref::<T>().ok_or_else(|| {
            WorkflowError::Input(InputError::TypeMismatch {
                slot: self.name(handle).unwrap_or_default().to_string(),
                expected: type_name::<T>(),
                found: value.type_name(),
            })
        })
    }

    /// One line per task: its name followed by the names of its direct
    /// dependencies.
    pub fn render_dag(&self) -> String {
        self.to_string()
    }

    pub fn print_dag(&self) {
        print!("{self}");
    }
}

impl Display for WorkflowManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        render_dag(&self.graph, f)
    }
}

fn render_dag(graph: &Graph<TaskNode, ()>, f: &mut Formatter<'_>) -> std::fmt::Result {
    for node in graph.node_weights() {
        write!(f, "{} -> [", node.name)?;

        let dependencies = node
            .dependencies
            .iter()
            .filter_map(|&dep| graph.node_weight(dep));

        for (i, dep) in dependencies.enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "'{}'", dep.name)?;
        }

        f.write_str("]\n")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Sequence;

    fn task1(_: &Inputs) -> anyhow::Result<i32> {
        Ok(10)
    }

    fn task2(inputs: &Inputs) -> anyhow::Result<i32> {
        Ok(inputs.get::<i32>(0)? * 3)
    }

    fn both(test: impl Fn(Schedule)) {
        test(Schedule::Eager);
        test(Schedule::Waves);
    }

    fn options(schedule: Schedule) -> Options {
        Options {
            schedule,
            threads: None,
        }
    }

    #[test]
    fn test_simple_linear() {
        both(|schedule| {
            let (mut wm, result) = WorkflowManager::declare_with(options(schedule), |wm| {
                let data = wm.task().run(task1);
                wm.task().arg(data).run(task2)
            });

            wm.run().unwrap();
            assert_eq!(wm.get::<i32>(&result).unwrap(), &30);
        });
    }

    #[test]
    fn test_three_stage_chain() {
        both(|schedule| {
            let (mut wm, (t1, t2, t3)) = WorkflowManager::declare_with(options(schedule), |wm| {
                let t1 = wm.task().run(task1);
                let t2 = wm.task().arg(t1).run(task2);
                let t3 = wm.task().arg(t2).run(task2);
                (t1, t2, t3)
            });

            wm.run().unwrap();
            assert_eq!(wm.get::<i32>(&t1).unwrap(), &10);
            assert_eq!(wm.get::<i32>(&t2).unwrap(), &30);
            assert_eq!(wm.get::<i32>(&t3).unwrap(), &90);
        });
    }

    #[test]
    fn test_unpack_multiple_outputs() {
        both(|schedule| {
            let (mut wm, (pair, sum)) = WorkflowManager::declare_with(options(schedule), |wm| {
                let pair = wm.task().outputs(2).run(|_| Ok((4, 5)));
                let mut parts = pair.into_iter();
                let (a, b) = (parts.next().unwrap(), parts.next().unwrap());
                assert!(parts.next().is_none());

                let sum = wm
                    .task()
                    .arg(a)
                    .arg(b)
                    .run(|inputs| Ok(inputs.get::<i32>(0)? + inputs.get::<i32>(1)?));
                (pair, sum)
            });

            assert!(matches!(
                wm.value(&pair.output(0)),
                Err(WorkflowError::NotDone { .. })
            ));

            wm.run().unwrap();
            assert_eq!(wm.get::<i32>(&sum).unwrap(), &9);
            assert_eq!(wm.get::<i32>(&pair.output(0)).unwrap(), &4);
            assert_eq!(wm.get::<i32>(&pair.output(1)).unwrap(), &5);
        });
    }

    #[test]
    fn test_outputs_store_a_sequence() {
        both(|schedule| {
            let (mut wm, (pair, sum)) = WorkflowManager::declare_with(options(schedule), |wm| {
                let pair = wm.task().outputs(2).run(|_| Ok(vec![4_i32, 5]));
                let mut parts = pair.into_iter();
                let (a, b) = (parts.next().unwrap(), parts.next().unwrap());

                let sum = wm
                    .task()
                    .arg(a)
                    .arg(b)
                    .run(|inputs| Ok(inputs.get::<i32>(0)? + inputs.get::<i32>(1)?));
                (pair, sum)
            });

            wm.run().unwrap();
            assert_eq!(wm.get::<i32>(&sum).unwrap(), &9);
            assert_eq!(wm.get::<Sequence>(&pair).unwrap().len(), 2);
        });
    }

    #[test]
    fn test_whole_result_yields_one_subtask() {
        let (mut wm, pair) = WorkflowManager::declare(|wm| wm.task().run(|_| Ok((4_i32, 5_i32))));

        let parts: Vec<SubTask> = pair.into_iter().collect();
        assert_eq!(parts.len(), 1);

        wm.run().unwrap();
        assert_eq!(wm.get::<(i32, i32)>(&parts[0]).unwrap(), &(4, 5));
        assert_eq!(wm.get::<(i32, i32)>(&pair).unwrap(), &(4, 5));
    }

    #[test]
    fn test_define_with_outputs() {
        let (mut wm, sum) = WorkflowManager::declare(|wm| {
            let pair = wm.reserve();
            let sum = wm
                .task()
                .arg(pair.output(0))
                .arg(pair.output(1))
                .run(|inputs| Ok(inputs.get::<i32>(0)? + inputs.get::<i32>(1)?));

            let pair = wm
                .task()
                .outputs(2)
                .define(pair, |_| Ok((4_i32, 5_i32)))
                .unwrap();
            assert_eq!(pair.into_iter().count(), 2);
            sum
        });

        wm.run().unwrap();
        assert_eq!(wm.get::<i32>(&sum).unwrap(), &9);
    }

    #[test]
    fn test_split_array_destructuring() {
        let (mut wm, (q, r)) = WorkflowManager::declare(|wm| {
            let [q, r]: [SubTask; 2] = wm.task().split(|_| Ok((17 / 5, 17 % 5)));
            (q, r)
        });

        assert_eq!(q.owner().num_output(), 2);
        wm.run().unwrap();
        assert_eq!(wm.get::<i32>(&q).unwrap(), &3);
        assert_eq!(wm.get::<i32>(&r).unwrap(), &2);
    }

    #[test]
    fn test_named_and_literal_arguments() {
        let (mut wm, out) = WorkflowManager::declare(|wm| {
            let base = wm.task().run(|_| Ok(7_i64));
            wm.task()
                .arg(base)
                .literal(2_i64)
                .named("offset", base)
                .named_literal("label", "sum")
                .run(|inputs| {
                    let total = inputs.get::<i64>(0)? * inputs.get::<i64>(1)?
                        + inputs.named::<i64>("offset")?;
                    Ok(format!("{}={}", inputs.named::<&str>("label")?, total))
                })
        });

        wm.run().unwrap();
        assert_eq!(wm.get::<String>(&out).unwrap(), "sum=21");
    }

    #[test]
    fn test_out_of_range_subtask_fails_on_read() {
        let (mut wm, (pair, bad)) = WorkflowManager::declare(|wm| {
            let pair = wm.task().outputs(2).run(|_| Ok(vec![1_u8]));
            (pair, pair.output(1))
        });

        wm.run().unwrap();
        assert_eq!(wm.get::<u8>(&pair.output(0)).unwrap(), &1);
        assert!(matches!(
            wm.value(&bad),
            Err(WorkflowError::Input(InputError::OutOfRange { index: 1, len: 1 }))
        ));
    }

    #[test]
    fn test_out_of_range_subtask_fails_dependent() {
        let (mut wm, _) = WorkflowManager::declare(|wm| {
            let pair = wm.task().outputs(2).run(|_| Ok([1_u8]));
            wm.task()
                .name("reader")
                .arg(pair.output(1))
                .run(|inputs| Ok(*inputs.get::<u8>(0)?))
        });

        let err = wm.run().unwrap_err();
        assert!(matches!(&err, WorkflowError::Task { name, .. } if name == "reader"));
    }

    #[test]
    fn test_failure_propagates_verbatim() {
        #[derive(Debug, thiserror::Error, PartialEq)]
        #[error("boom")]
        struct Boom;

        both(|schedule| {
            let (mut wm, (ok, failing)) = WorkflowManager::declare_with(options(schedule), |wm| {
                let ok = wm.task().run(task1);
                let after = wm.task().arg(ok).run(task2);
                let failing = wm
                    .task()
                    .name("boom")
                    .arg(after)
                    .run(|_| -> anyhow::Result<()> { Err(Boom.into()) });
                (ok, failing)
            });

            let err = wm.run().unwrap_err();
            assert_eq!(err.to_string(), "boom");
            assert_eq!(
                err.task_error().and_then(|e| e.downcast_ref::<Boom>()),
                Some(&Boom)
            );

            assert!(wm.is_done(&ok));
            assert_eq!(wm.get::<i32>(&ok).unwrap(), &10);
            assert!(!wm.is_done(&failing));
        });
    }

    #[test]
    fn test_cycle_is_detected() {
        both(|schedule| {
            let (mut wm, (a, b)) = WorkflowManager::declare_with(options(schedule), |wm| {
                let a = wm.reserve();
                let b = wm.task().name("b").arg(a).run(task2);
                let a = wm.task().name("a").arg(b).define(a, task2).unwrap();
                (a, b)
            });

            let err = wm.run().unwrap_err();
            match err {
                WorkflowError::GraphNotProgressing { pending } => {
                    assert_eq!(pending, ["a", "b"]);
                }
                other => panic!("unexpected error: {other}"),
            }
            assert!(!wm.is_done(&a));
            assert!(!wm.is_done(&b));
        });
    }

    #[test]
    fn test_undefined_reservation_never_completes() {
        let (mut wm, _) = WorkflowManager::declare(|wm| {
            let later = wm.reserve();
            wm.task().arg(later).run(task2)
        });

        assert!(matches!(
            wm.run(),
            Err(WorkflowError::GraphNotProgressing { .. })
        ));
    }

    #[test]
    fn test_define_twice() {
        let mut bp = Blueprint::new();
        let slot = bp.reserve();
        bp.task().define(slot, task1).unwrap();

        assert!(matches!(
            bp.task().define(slot, task1),
            Err(WorkflowError::AlreadyDefined { .. })
        ));
    }

    #[test]
    fn test_inputs_and_outputs() {
        let (mut wm, ()) = WorkflowManager::declare(|wm| {
            let data = wm.input();
            let result = wm.task().arg(data).run(task2);
            wm.output(result);
        });

        let outputs = wm.call([Value::new(4)]).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].downcast_ref::<i32>(), Some(&12));
    }

    #[test]
    fn test_inputs_filled_in_declaration_order() {
        let mut bp = WorkflowManager::design();
        let a = bp.input();
        let b = bp.input();
        let diff = bp
            .task()
            .arg(a)
            .arg(b)
            .run(|inputs| Ok(inputs.get::<i32>(0)? - inputs.get::<i32>(1)?));
        bp.output(diff);

        let mut wm = bp.finish();
        let out = wm.call([Value::new(10), Value::new(3)]).unwrap();
        assert_eq!(out[0].downcast_ref::<i32>(), Some(&7));
        assert_eq!(wm.name(&b), Some("input#1"));
    }

    #[test]
    fn test_input_count_mismatch() {
        let (mut wm, _) = WorkflowManager::declare(|wm| wm.input());

        assert!(matches!(
            wm.run(),
            Err(WorkflowError::InputCount {
                expected: 1,
                got: 0
            })
        ));

        // a rejected call does not consume the workflow
        wm.run_with([Value::new(1)]).unwrap();
    }

    #[test]
    fn test_run_once() {
        let (mut wm, t) = WorkflowManager::declare(|wm| wm.task().run(task1));

        wm.run().unwrap();
        assert!(matches!(wm.run(), Err(WorkflowError::AlreadyRun)));
        assert_eq!(wm.get::<i32>(&t).unwrap(), &10);
    }

    #[test]
    fn test_get_type_mismatch() {
        let (mut wm, t) = WorkflowManager::declare(|wm| wm.task().name("ten").run(task1));

        wm.run().unwrap();
        assert!(matches!(
            wm.get::<String>(&t),
            Err(WorkflowError::Input(InputError::TypeMismatch { found: "i32", .. }))
        ));
    }

    #[test]
    fn test_run_from_inside_rayon() {
        let outer = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap();

        let options = Options {
            schedule: Schedule::Eager,
            threads: Some(1),
        };
        let (mut wm, result) = WorkflowManager::declare_with(options, |wm| {
            let data = wm.task().run(task1);
            wm.task().arg(data).run(task2)
        });

        outer.install(|| wm.run()).unwrap();
        assert_eq!(wm.get::<i32>(&result).unwrap(), &30);
    }

    #[test]
    fn test_empty_workflow() {
        let mut wm = Blueprint::new().finish();
        assert!(wm.is_empty());
        wm.run().unwrap();
    }

    #[test]
    fn test_render_dag() {
        let (wm, _) = WorkflowManager::declare(|wm| {
            let t1 = wm.task().name("task1").run(task1);
            let t2 = wm.task().name("task2").arg(t1).run(task2);
            wm.task().name("sum").arg(t1).named("x", t2).literal(1).run(task2)
        });

        assert_eq!(
            wm.render_dag(),
            "task1 -> []\ntask2 -> ['task1']\nsum -> ['task1', 'task2']\n"
        );
    }

    #[test]
    fn test_default_name_is_callable_type() {
        let (wm, t) = WorkflowManager::declare(|wm| wm.task().run(task1));
        assert!(wm.name(&t).unwrap().ends_with("task1"));
    }
}
