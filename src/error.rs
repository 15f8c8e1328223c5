//! Error Types
//!
//! A single error enum covers everything that can go wrong while talking
//! to the conda executable. Front-ends decide how to present it.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while locating, running, or parsing conda.
#[derive(Debug, Error)]
pub enum CondaError {
    /// The conda executable could not be spawned.
    #[error("conda executable not found ({0}); make sure conda is installed and on PATH")]
    NotFound(PathBuf),

    /// The command ran longer than the configured timeout.
    #[error("command timed out after {0} seconds")]
    Timeout(u64),

    /// The command exited with a non-zero status.
    #[error("conda command failed: {0}")]
    CommandFailed(String),

    /// Output could not be parsed.
    #[error("failed to parse conda output: {0}")]
    Parse(String),

    /// Exported YAML could not be parsed; the raw output was saved for inspection.
    #[error("failed to parse exported YAML (raw output saved to {debug_file}): {message}")]
    ExportParse { message: String, debug_file: PathBuf },

    /// Name does not satisfy the environment naming rules.
    #[error("invalid environment name '{0}': only letters, digits, '_', '-' and '.' are allowed, and it must not start with '.'")]
    InvalidName(String),

    /// An environment with this name already exists.
    #[error("environment '{0}' already exists")]
    AlreadyExists(String),

    /// No environment with this name exists.
    #[error("environment '{0}' does not exist")]
    NoSuchEnv(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CondaError {
    /// Returns true for errors caused by the caller's input rather than conda.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidName(_) | Self::AlreadyExists(_) | Self::NoSuchEnv(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CondaError>;
