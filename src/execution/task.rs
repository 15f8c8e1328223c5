//! Background Tasks
//!
//! Long-running conda commands run on tokio tasks so callers can return
//! immediately and poll for progress by task id.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::progress::{OperationKind, ProgressTracker};
use crate::environment::conda::{clone_args, create_args};
use crate::environment::Conda;
use crate::error::{CondaError, Result};
use crate::monitoring::ActivityLog;

/// Output lines kept to explain a failed command.
const FAILURE_TAIL: usize = 5;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Unknown,
}

/// Snapshot of a task's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    /// Estimated completion, 0-100
    pub progress: u8,
    pub stage: String,
    pub status: TaskStatus,
}

impl TaskProgress {
    pub fn running(progress: u8, stage: impl Into<String>) -> Self {
        Self {
            progress: progress.min(100),
            stage: stage.into(),
            status: TaskStatus::Running,
        }
    }

    pub fn completed(stage: impl Into<String>) -> Self {
        Self {
            progress: 100,
            stage: stage.into(),
            status: TaskStatus::Completed,
        }
    }

    pub fn failed(stage: impl Into<String>) -> Self {
        Self {
            progress: 0,
            stage: stage.into(),
            status: TaskStatus::Failed,
        }
    }

    /// Reported for ids the registry has never seen.
    pub fn unknown() -> Self {
        Self {
            progress: 0,
            stage: "Task not found or already finished".to_string(),
            status: TaskStatus::Unknown,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status != TaskStatus::Running
    }
}

/// Shared table of task progress keyed by task id.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<String, TaskProgress>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: &str, progress: TaskProgress) {
        let mut tasks = self.tasks.write().unwrap_or_else(|p| p.into_inner());
        tasks.insert(id.to_string(), progress);
    }

    /// Current progress, or [`TaskProgress::unknown`] for unseen ids.
    pub fn get(&self, id: &str) -> TaskProgress {
        let tasks = self.tasks.read().unwrap_or_else(|p| p.into_inner());
        tasks.get(id).cloned().unwrap_or_else(TaskProgress::unknown)
    }

    pub fn len(&self) -> usize {
        self.tasks.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A conda operation to run in the background.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create { name: String, python_version: String },
    Clone { source: String, new_name: String },
    Remove { name: String },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create { .. } => OperationKind::Create,
            Self::Clone { .. } => OperationKind::Clone,
            Self::Remove { .. } => OperationKind::Remove,
        }
    }

    /// Message logged when the operation starts.
    pub fn start_message(&self) -> String {
        match self {
            Self::Create {
                name,
                python_version,
            } => format!("Creating environment: {} (Python {})", name, python_version),
            Self::Clone { source, new_name } => {
                format!("Cloning environment: {} -> {}", source, new_name)
            }
            Self::Remove { name } => format!("Removing environment: {}", name),
        }
    }

    /// Message logged when the operation succeeds.
    pub fn success_message(&self) -> String {
        match self {
            Self::Create { name, .. } => format!("Environment '{}' created", name),
            Self::Clone { source, new_name } => {
                format!("Cloned environment: {} -> {}", source, new_name)
            }
            Self::Remove { name } => format!("Environment '{}' removed", name),
        }
    }
}

/// Runs operations and keeps the registry and activity log up to date.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    conda: Conda,
    registry: TaskRegistry,
    activity: ActivityLog,
}

impl TaskRunner {
    pub fn new(conda: Conda, registry: TaskRegistry, activity: ActivityLog) -> Self {
        Self {
            conda,
            registry,
            activity,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Starts an operation on a tokio task and returns its id.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, op: Operation) -> String {
        let id = Uuid::new_v4().to_string();
        self.registry
            .set(&id, TaskProgress::running(0, op.kind().preparing_stage()));

        let runner = self.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            runner.run(&task_id, op).await;
        });
        id
    }

    /// Runs an operation to completion under the given id.
    pub async fn run(&self, id: &str, op: Operation) -> TaskProgress {
        self.activity.info(op.start_message());
        let kind = op.kind();

        let outcome = match self.execute(id, &op).await {
            Ok(()) => {
                self.activity.info(op.success_message());
                TaskProgress::completed(kind.complete_stage())
            }
            Err(e) => {
                let stage = kind.failed_stage(&e.to_string());
                self.activity.error(stage.clone());
                TaskProgress::failed(stage)
            }
        };

        self.registry.set(id, outcome.clone());
        outcome
    }

    /// Polls until the task finishes.
    pub async fn wait(&self, id: &str, poll: Duration) -> TaskProgress {
        loop {
            let progress = self.registry.get(id);
            if progress.is_finished() {
                return progress;
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn execute(&self, id: &str, op: &Operation) -> Result<()> {
        let kind = op.kind();
        let (progress, stage) = kind.started();
        self.registry.set(id, TaskProgress::running(progress, stage));

        match op {
            Operation::Create {
                name,
                python_version,
            } => {
                let python = format!("python={}", python_version);
                self.stream(id, kind, &create_args(name, &python)).await
            }
            Operation::Clone { source, new_name } => {
                self.stream(id, kind, &clone_args(source, new_name)).await
            }
            Operation::Remove { name } => self.conda.remove_env(name).await,
        }
    }

    async fn stream(&self, id: &str, kind: OperationKind, args: &[&str]) -> Result<()> {
        let mut command = self.conda.spawn_streaming(args)?;
        let mut tracker = ProgressTracker::for_kind(kind);
        let mut tail: VecDeque<String> = VecDeque::with_capacity(FAILURE_TAIL);

        while let Some(line) = command.next_line().await {
            debug!("[{}] {}", id, line);
            if let Some(update) = tracker.observe(&line) {
                self.registry
                    .set(id, TaskProgress::running(update.progress, update.stage));
            }
            if !line.trim().is_empty() {
                if tail.len() == FAILURE_TAIL {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }

        let status = command.wait().await?;
        if status.success() {
            return Ok(());
        }

        let detail = if tail.is_empty() {
            format!("conda exited with {}", status)
        } else {
            Vec::from(tail).join("\n")
        };
        Err(CondaError::CommandFailed(detail))
    }
}
