//! Background Execution Module
//!
//! Runs slow conda operations off the caller's task and estimates their
//! progress from live output.
//!
//! # Architecture
//!
//! - [`task`]: task registry and runner
//! - [`progress`]: output-based progress heuristics

pub mod progress;
pub mod task;

pub use progress::{OperationKind, ProgressTracker};
pub use task::{Operation, TaskProgress, TaskRegistry, TaskRunner, TaskStatus};
