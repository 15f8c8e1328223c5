//! Progress Heuristics
//!
//! Conda does not report machine-readable progress, so percentages are
//! estimated from well-known phrases in its live output.

use serde::Serialize;

/// Progress reported once a long-running command has been spawned.
const STREAM_START: u8 = 20;

/// Ceiling for clone progress while files are still being linked.
const CLONE_CEILING: u8 = 80;

/// Increment applied for each copied or linked file during a clone.
const CLONE_STEP: u8 = 5;

/// Kind of background operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Clone,
    Remove,
}

impl OperationKind {
    /// Capitalised verb used in stage and log messages.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Clone => "Clone",
            Self::Remove => "Remove",
        }
    }

    /// Stage shown before anything runs.
    pub fn preparing_stage(&self) -> &'static str {
        match self {
            Self::Create => "Preparing to create environment...",
            Self::Clone => "Preparing to clone environment...",
            Self::Remove => "Removing environment...",
        }
    }

    /// First stage once work has started, with its progress value.
    pub fn started(&self) -> (u8, &'static str) {
        match self {
            Self::Create => (10, "Solving dependencies..."),
            Self::Clone => (10, "Copying files..."),
            Self::Remove => (30, "Removing packages..."),
        }
    }

    /// Stage shown on success.
    pub fn complete_stage(&self) -> String {
        format!("{} complete", self.verb())
    }

    /// Stage shown on failure.
    pub fn failed_stage(&self, reason: &str) -> String {
        format!("{} failed: {}", self.verb(), reason)
    }
}

/// A progress change derived from one output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub progress: u8,
    pub stage: &'static str,
}

/// Turns conda output lines into progress estimates.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    kind: OperationKind,
    progress: u8,
}

impl ProgressTracker {
    pub fn for_kind(kind: OperationKind) -> Self {
        Self {
            kind,
            progress: STREAM_START,
        }
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Inspects one line of output; returns an update if it matched.
    pub fn observe(&mut self, line: &str) -> Option<ProgressUpdate> {
        let stage = match self.kind {
            OperationKind::Create => self.observe_create(line)?,
            OperationKind::Clone => self.observe_clone(line)?,
            OperationKind::Remove => return None,
        };
        Some(ProgressUpdate {
            progress: self.progress,
            stage,
        })
    }

    fn observe_create(&mut self, line: &str) -> Option<&'static str> {
        if line.contains("Solving environment") {
            Some("Solving dependencies...")
        } else if line.contains("Verifying") {
            self.progress = 50;
            Some("Verifying...")
        } else if line.contains("Downloading") || line.contains("Extracting") {
            self.progress = 70;
            Some("Downloading/extracting packages...")
        } else if line.contains("Executing") {
            self.progress = 85;
            Some("Executing transaction...")
        } else {
            None
        }
    }

    fn observe_clone(&mut self, line: &str) -> Option<&'static str> {
        if line.contains("Copying") || line.contains("Linking") {
            self.progress = (self.progress + CLONE_STEP).min(CLONE_CEILING);
            Some("Copying/linking files...")
        } else {
            None
        }
    }
}
