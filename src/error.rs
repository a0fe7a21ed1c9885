use std::borrow::Cow;
use std::sync::mpsc::RecvError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(
        "Graph is not progressing, {} task(s) can never become ready: {}",
        .pending.len(),
        .pending.join(", ")
    )]
    GraphNotProgressing { pending: Vec<String> },

    #[error("Scheduler exceeded its budget of {budget} waves with {remaining} task(s) remaining")]
    IterationBudgetExceeded { budget: usize, remaining: usize },

    /// The callable of task `name` failed. Displays the callable's error verbatim.
    #[error("{error}")]
    Task {
        name: Cow<'static, str>,
        error: anyhow::Error,
    },

    #[error("Task '{name}' has not completed")]
    NotDone { name: Cow<'static, str> },

    #[error("Task with index {index} does not belong to this workflow")]
    UnknownTask { index: usize },

    #[error("Workflow has already been run")]
    AlreadyRun,

    #[error("Task '{name}' already has a body")]
    AlreadyDefined { name: Cow<'static, str> },

    #[error("Workflow expects {expected} input(s), got {got}")]
    InputCount { expected: usize, got: usize },

    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Couldn't build worker pool.\n{0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Template(#[from] indicatif::style::TemplateError),

    #[error("Worker channel closed unexpectedly.\n{0}")]
    Channel(#[from] RecvError),
}

impl WorkflowError {
    /// The error returned by a failing callable, if this is one.
    pub fn task_error(&self) -> Option<&anyhow::Error> {
        match self {
            WorkflowError::Task { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Failures while resolving the inputs handed to a callable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Missing positional argument {0}")]
    MissingPositional(usize),

    #[error("Missing named argument '{0}'")]
    MissingNamed(String),

    #[error("Argument {slot}: expected {expected}, found {found}")]
    TypeMismatch {
        slot: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Value of type {found} is not a multi-valued result")]
    NotASequence { found: &'static str },

    #[error("Output index {index} is out of range for a result with {len} element(s)")]
    OutOfRange { index: usize, len: usize },
}
