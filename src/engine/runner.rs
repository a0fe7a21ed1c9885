mod diagnostics;

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::channel;
use std::time::{Duration, Instant};

use indicatif::ProgressStyle;
use petgraph::Graph;
use petgraph::graph::NodeIndex;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use rayon::{Scope, ThreadPool, ThreadPoolBuilder};
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::core::{Options, Schedule};
use crate::engine::TaskNode;
use crate::error::WorkflowError;

pub use diagnostics::{Diagnostics, Mermaid};

/// Timing of a single executed task.
#[derive(Debug, Clone)]
pub struct TaskExecution {
    pub start: Instant,
    pub duration: Duration,
    /// The wave the task was submitted in, when running with
    /// [`Schedule::Waves`].
    pub wave: Option<usize>,
}

type Outcome = (Result<(), WorkflowError>, Instant, Duration);

/// Runs every node that is not done yet, on the pool selected by `options`.
pub(crate) fn run(
    graph: &Graph<TaskNode, ()>,
    options: &Options,
) -> Result<Diagnostics, WorkflowError> {
    let pool = match options.threads {
        Some(threads) => Some(ThreadPoolBuilder::new().num_threads(threads).build()?),
        None => None,
    };

    let pending: Vec<NodeIndex> = graph
        .node_indices()
        .filter(|&index| !graph[index].is_done())
        .collect();

    if pending.is_empty() {
        return Ok(Diagnostics::default());
    }

    let root_span = tracing::span!(Level::INFO, "running_tasks");
    root_span.pb_set_length(pending.len() as u64);
    root_span.pb_set_style(&crate::utils::get_style_main()?);
    root_span.pb_set_message("Running tasks...");
    let _enter = root_span.enter();

    let result = match options.schedule {
        Schedule::Eager => run_eager(graph, pending, pool.as_ref(), &root_span),
        Schedule::Waves => run_waves(graph, pending, pool.as_ref(), &root_span),
    };

    match &result {
        Ok(_) => tracing::info!("Workflow complete!"),
        Err(err) => tracing::error!("Workflow failed: {err}"),
    }

    result
}

/// Executes the graph in waves.
///
/// 1. Every node that is not done yet starts out as remaining.
/// 2. The ready subset of the remaining nodes forms the next wave. An empty
///    wave while nodes remain means a cycle or a node that can never run.
/// 3. The wave is executed on the pool and joined as a whole before anything
///    else happens, so a later wave never starts early.
/// 4. If any node of the wave failed, the first failure in declaration order
///    is returned. Otherwise the completed nodes leave the remaining set.
///
/// An acyclic graph of `n` nodes drains in at most `n` waves, running past that
/// bound means the scheduler itself is broken.
fn run_waves(
    graph: &Graph<TaskNode, ()>,
    mut remaining: Vec<NodeIndex>,
    pool: Option<&ThreadPool>,
    root_span: &tracing::Span,
) -> Result<Diagnostics, WorkflowError> {
    let budget = remaining.len();
    let pb_style = crate::utils::get_style_task()?;
    let mut execution_times = HashMap::new();
    let mut waves = 0;

    while !remaining.is_empty() {
        if waves >= budget {
            return Err(WorkflowError::IterationBudgetExceeded {
                budget,
                remaining: remaining.len(),
            });
        }

        let ready: Vec<NodeIndex> = remaining
            .iter()
            .copied()
            .filter(|&index| graph[index].is_ready(graph))
            .collect();

        if ready.is_empty() {
            return Err(not_progressing(graph));
        }

        tracing::debug!(wave = waves, size = ready.len(), "submitting wave");

        // collect() only returns once every task of the wave has finished
        let style = pb_style.clone();
        let wave = move || -> Vec<(NodeIndex, Outcome)> {
            ready
                .par_iter()
                .map_with(style, |style, &index| (index, execute(graph, index, style)))
                .collect()
        };
        let outcomes = match pool {
            Some(pool) => pool.install(wave),
            None => wave(),
        };

        let mut failure = None;
        for (index, (outcome, start, duration)) in outcomes {
            execution_times.insert(
                index,
                TaskExecution {
                    start,
                    duration,
                    wave: Some(waves),
                },
            );

            match outcome {
                Ok(()) => root_span.pb_inc(1),
                Err(err) => {
                    tracing::error!(name = %graph[index].name, "task failed");
                    failure.get_or_insert(err);
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        remaining.retain(|&index| !graph[index].is_done());
        waves += 1;
    }

    Ok(Diagnostics {
        execution_times,
        waves: Some(waves),
    })
}

/// This function executes the task graph on the rayon pool, starting each task
/// as soon as its dependencies are met.
///
/// The algorithm works as follows:
/// 1. Every pending node gets a count of its dependencies that are not done.
/// 2. Nodes with a count of zero are spawned on the pool.
/// 3. The calling thread waits on a channel for finished tasks.
/// 4. When a task completes, the counts of its dependents are decremented and
///    any dependent reaching zero is spawned immediately.
/// 5. If nothing is in flight while nodes are still pending, the graph can't
///    progress and the run fails.
///
/// On failure no new task is spawned. Tasks already in flight are awaited by
/// the scope before the error is returned.
fn run_eager(
    graph: &Graph<TaskNode, ()>,
    pending: Vec<NodeIndex>,
    pool: Option<&ThreadPool>,
    root_span: &tracing::Span,
) -> Result<Diagnostics, WorkflowError> {
    // Build a map from a dependency to the nodes that depend on it.
    let mut dependents: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
    for edge in graph.raw_edges() {
        dependents
            .entry(edge.source())
            .or_default()
            .push(edge.target());
    }

    // Only dependencies that still have to run are counted.
    let dependency_counts: HashMap<NodeIndex, usize> = pending
        .iter()
        .map(|&index| {
            (
                index,
                graph
                    .neighbors_directed(index, petgraph::Direction::Incoming)
                    .filter(|&dep| !graph[dep].is_done())
                    .count(),
            )
        })
        .collect();

    let mut countdown = Countdown {
        graph,
        dependents,
        dependency_counts,
        execution_times: HashMap::new(),
        pb_style: crate::utils::get_style_task()?,
    };

    // The scope body blocks on a channel, so it runs on the calling thread
    // rather than occupying a worker of the pool.
    let result = match pool {
        Some(pool) => pool.in_place_scope(|s| countdown.drive(s, &pending, root_span)),
        None => rayon::in_place_scope(|s| countdown.drive(s, &pending, root_span)),
    };
    result?;

    Ok(Diagnostics {
        execution_times: countdown.execution_times,
        waves: None,
    })
}

struct Countdown<'g> {
    graph: &'g Graph<TaskNode, ()>,
    dependents: HashMap<NodeIndex, Vec<NodeIndex>>,
    dependency_counts: HashMap<NodeIndex, usize>,
    execution_times: HashMap<NodeIndex, TaskExecution>,
    pb_style: ProgressStyle,
}

impl<'g> Countdown<'g> {
    fn drive<'s>(
        &mut self,
        s: &Scope<'s>,
        pending: &[NodeIndex],
        root_span: &tracing::Span,
    ) -> Result<(), WorkflowError>
    where
        'g: 's,
    {
        let graph = self.graph;
        let (result_sender, result_receiver) = channel::<(NodeIndex, Outcome)>();

        let spawn_task = |index: NodeIndex| {
            let sender = result_sender.clone();
            let pb_style = self.pb_style.clone();

            s.spawn(move |_| {
                let outcome = execute(graph, index, &pb_style);
                // The receiver is gone once the scheduler bailed out on an
                // earlier failure.
                sender.send((index, outcome)).ok();
            });
        };

        let mut in_flight = 0;
        let mut completed_tasks = 0;

        for &index in pending {
            if self.dependency_counts[&index] == 0 && graph[index].is_ready(graph) {
                spawn_task(index);
                in_flight += 1;
            }
        }

        while completed_tasks < pending.len() {
            if in_flight == 0 {
                return Err(not_progressing(graph));
            }

            let (index, (outcome, start, duration)) = result_receiver.recv()?;
            in_flight -= 1;

            self.execution_times.insert(
                index,
                TaskExecution {
                    start,
                    duration,
                    wave: None,
                },
            );

            if let Err(err) = outcome {
                tracing::error!(name = %graph[index].name, "task failed");
                return Err(err);
            }

            completed_tasks += 1;
            root_span.pb_inc(1);

            let Some(next) = self.dependents.get(&index) else {
                continue;
            };

            for &dependent in next {
                if let Some(count) = self.dependency_counts.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 && graph[dependent].is_ready(graph) {
                        spawn_task(dependent);
                        in_flight += 1;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Runs a single node inside its own span, turning a panic into an error.
fn execute(graph: &Graph<TaskNode, ()>, index: NodeIndex, pb_style: &ProgressStyle) -> Outcome {
    let task = &graph[index];

    let span = tracing::span!(Level::INFO, "task", name = %task.name);
    span.pb_set_style(pb_style);
    span.pb_set_message(&format!("Running {}", task.name));
    let _enter = span.enter();

    let start = Instant::now();

    let outcome = match catch_unwind(AssertUnwindSafe(|| task.execute(graph))) {
        Ok(outcome) => outcome,
        Err(panic) => {
            let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                format!("Task panicked: {s}")
            } else if let Some(s) = panic.downcast_ref::<String>() {
                format!("Task panicked: {s}")
            } else {
                String::from("Task panicked with unknown payload")
            };

            Err(WorkflowError::Task {
                name: task.name.clone(),
                error: anyhow::anyhow!(msg),
            })
        }
    };

    (outcome, start, start.elapsed())
}

fn not_progressing(graph: &Graph<TaskNode, ()>) -> WorkflowError {
    let pending = graph
        .node_weights()
        .filter(|node| !node.is_done())
        .map(|node| node.name.to_string())
        .collect();

    WorkflowError::GraphNotProgressing { pending }
}
