use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use petgraph::Graph;
use petgraph::graph::NodeIndex;

use crate::core::Value;
use crate::engine::{Arg, Inputs};
use crate::error::WorkflowError;

/// Type-erased user callable. The typed builder methods wrap the user's
/// closure into this shape, this is where the output type gets erased.
pub(crate) type Callable = Box<dyn Fn(&Inputs) -> anyhow::Result<Value> + Send + Sync>;

pub(crate) enum Kind {
    Call(Callable),
    /// Placeholder filled from the values passed to `run_with`.
    Input,
    /// Declared through `reserve`, body not attached yet.
    Reserved,
}

pub(crate) struct TaskNode {
    pub name: Cow<'static, str>,
    pub kind: Kind,
    pub args: Vec<Arg>,
    pub named: BTreeMap<String, Arg>,
    /// Distinct upstream nodes, in order of first appearance.
    pub dependencies: Vec<NodeIndex>,
    pub num_output: usize,
    result: OnceLock<Value>,
}

impl TaskNode {
    pub fn call(
        name: Cow<'static, str>,
        callable: Callable,
        args: Vec<Arg>,
        named: BTreeMap<String, Arg>,
        num_output: usize,
    ) -> Self {
        let mut dependencies = Vec::new();

        for dependency in args
            .iter()
            .chain(named.values())
            .filter_map(Arg::dependency)
        {
            if !dependencies.contains(&dependency) {
                dependencies.push(dependency);
            }
        }

        Self {
            name,
            kind: Kind::Call(callable),
            args,
            named,
            dependencies,
            num_output,
            result: OnceLock::new(),
        }
    }

    pub fn input(slot: usize) -> Self {
        Self::bare(format!("input#{slot}").into(), Kind::Input)
    }

    pub fn reserved(name: Cow<'static, str>) -> Self {
        Self::bare(name, Kind::Reserved)
    }

    fn bare(name: Cow<'static, str>, kind: Kind) -> Self {
        Self {
            name,
            kind,
            args: Vec::new(),
            named: BTreeMap::new(),
            dependencies: Vec::new(),
            num_output: 1,
            result: OnceLock::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.result.get().is_some()
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.get()
    }

    /// True once every dependency has published its result. Only callables
    /// are ever ready, inputs are filled before scheduling and reserved nodes
    /// never run.
    pub fn is_ready(&self, graph: &Graph<TaskNode, ()>) -> bool {
        matches!(self.kind, Kind::Call(_))
            && self
                .dependencies
                .iter()
                .all(|&dep| graph.node_weight(dep).is_some_and(TaskNode::is_done))
    }

    /// Stores the result. The cell is write-once, a second write means the
    /// node was scheduled twice.
    pub fn publish(&self, value: Value) -> Result<(), WorkflowError> {
        self.result
            .set(value)
            .map_err(|_| WorkflowError::AlreadyRun)
    }

    /// Substitutes the results of upstream tasks into the argument slots.
    pub fn resolve(&self, graph: &Graph<TaskNode, ()>) -> Result<Inputs, WorkflowError> {
        let positional = self
            .args
            .iter()
            .map(|arg| self.resolve_arg(arg, graph))
            .collect::<Result<Vec<_>, _>>()?;

        let named = self
            .named
            .iter()
            .map(|(key, arg)| Ok((key.clone(), self.resolve_arg(arg, graph)?)))
            .collect::<Result<BTreeMap<_, _>, WorkflowError>>()?;

        Ok(Inputs::new(positional, named))
    }

    fn resolve_arg(&self, arg: &Arg, graph: &Graph<TaskNode, ()>) -> Result<Value, WorkflowError> {
        let (index, output) = match arg {
            Arg::Literal(value) => return Ok(value.clone()),
            Arg::Task(task) => (task.index(), None),
            Arg::SubTask(sub) => (sub.owner().index(), Some(sub.index())),
        };

        let upstream = graph
            .node_weight(index)
            .ok_or(WorkflowError::UnknownTask {
                index: index.index(),
            })?;

        let result = upstream.result().ok_or_else(|| WorkflowError::NotDone {
            name: upstream.name.clone(),
        })?;

        match output {
            None => Ok(result.clone()),
            Some(i) => result
                .index(i)
                .cloned()
                .map_err(|error| WorkflowError::Task {
                    name: self.name.clone(),
                    error: error.into(),
                }),
        }
    }

    /// Runs the callable and publishes its result.
    pub fn execute(&self, graph: &Graph<TaskNode, ()>) -> Result<(), WorkflowError> {
        let Kind::Call(callable) = &self.kind else {
            return Err(WorkflowError::NotDone {
                name: self.name.clone(),
            });
        };

        let inputs = self.resolve(graph)?;
        let output = callable(&inputs).map_err(|error| WorkflowError::Task {
            name: self.name.clone(),
            error,
        })?;

        self.publish(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{IntoArg, Task};

    fn callable<F>(f: F) -> Callable
    where
        F: Fn(&Inputs) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Box::new(f)
    }

    fn constant(graph: &mut Graph<TaskNode, ()>, value: i32) -> Task {
        let node = TaskNode::call(
            "constant".into(),
            callable(move |_| Ok(Value::new(value))),
            vec![],
            BTreeMap::new(),
            1,
        );
        Task::new(graph.add_node(node), 1)
    }

    #[test]
    fn test_dependencies_are_distinct() {
        let mut graph = Graph::new();
        let a = constant(&mut graph, 1);
        let b = constant(&mut graph, 2);

        let mut named = BTreeMap::new();
        named.insert("x".to_string(), a.into_arg());
        let node = TaskNode::call(
            "sum".into(),
            callable(|_| Ok(Value::new(()))),
            vec![b.into_arg(), a.output(0).into_arg(), Value::new(3).into_arg(), b.into_arg()],
            named,
            1,
        );

        assert_eq!(node.dependencies, vec![b.index(), a.index()]);
    }

    #[test]
    fn test_ready_after_dependencies_publish() {
        let mut graph = Graph::new();
        let a = constant(&mut graph, 10);
        let node = TaskNode::call(
            "triple".into(),
            callable(|inputs| Ok(Value::new(inputs.get::<i32>(0)? * 3))),
            vec![a.into_arg()],
            BTreeMap::new(),
            1,
        );
        let b = graph.add_node(node);

        assert!(graph[a.index()].is_ready(&graph));
        assert!(!graph[b].is_ready(&graph));

        graph[a.index()].execute(&graph).unwrap();
        assert!(graph[a.index()].is_done());
        assert!(graph[b].is_ready(&graph));

        graph[b].execute(&graph).unwrap();
        assert_eq!(graph[b].result().unwrap().downcast_ref::<i32>(), Some(&30));
    }

    #[test]
    fn test_failure_leaves_node_pending() {
        let mut graph = Graph::new();
        let node = TaskNode::call(
            "boom".into(),
            callable(|_| Err(anyhow::anyhow!("boom"))),
            vec![],
            BTreeMap::new(),
            1,
        );
        let index = graph.add_node(node);

        let err = graph[index].execute(&graph).unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(!graph[index].is_done());
    }

    #[test]
    fn test_publish_is_write_once() {
        let node = TaskNode::input(0);
        node.publish(Value::new(1)).unwrap();
        assert!(matches!(
            node.publish(Value::new(2)),
            Err(WorkflowError::AlreadyRun)
        ));
        assert_eq!(node.result().unwrap().downcast_ref::<i32>(), Some(&1));
    }

    #[test]
    fn test_reserved_and_inputs_are_never_ready() {
        let graph = Graph::new();
        assert!(!TaskNode::reserved("later".into()).is_ready(&graph));
        assert!(!TaskNode::input(0).is_ready(&graph));

        let input = TaskNode::input(2);
        assert!(matches!(input.kind, Kind::Input));
        assert_eq!(input.name, "input#2");
    }
}
