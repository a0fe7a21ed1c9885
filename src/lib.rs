#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod blueprint;
mod core;
mod engine;
mod error;
mod utils;

pub use crate::blueprint::{Blueprint, SplitDef, TaskDef, WorkflowManager};
pub use crate::core::{IntoSequence, Options, Schedule, Sequence, Value};
pub use crate::engine::{
    Arg, Diagnostics, Handle, Inputs, IntoArg, Mermaid, SubTask, SubTasks, Task, TaskExecution,
};
pub use crate::error::{InputError, WorkflowError};
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;
