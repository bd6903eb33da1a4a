// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`backend`] is the OS capability interface: start a shell line in its
//!   own process group, terminate the group, wait.
//! - [`executor_loop`] owns the bounded queue, the worker pool and the kill
//!   routine.
//! - [`task_runner`] drives a single command from spawn to terminal response.
//! - [`output`] captures stdout/stderr and decides inline vs. file delivery.

pub mod backend;
pub mod executor_loop;
pub mod output;
pub mod task_runner;

pub use backend::{LaunchedProcess, ProcessGroup, ProcessLauncher, ShellLauncher};
pub use executor_loop::{Executor, ExecutorHandle, ExecutorSettings, spawn_executor};
pub use output::{OutputSettings, RoutedStream, ScratchFile, StreamKind};
pub use task_runner::{Job, RunContext};
