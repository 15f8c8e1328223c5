//! CondaKeeper - Conda Environment Manager
//!
//! Web and terminal front-ends for listing, creating, cloning, removing,
//! and exporting conda environments. All real work is delegated to the
//! conda executable; this crate finds it, runs it, and makes sense of its
//! output.
//!
//! # Architecture
//!
//! - [`environment`]: locating and running conda, parsing its output, export
//! - [`execution`]: background tasks with progress estimates
//! - [`monitoring`]: activity log shown by the front-ends
//! - [`server`]: HTTP API and web page
//! - [`config`]: settings file and defaults
//!
//! # Example
//!
//! ```rust,no_run
//! use condakeeper::environment::Conda;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let conda = Conda::detect();
//!     conda.create_env("analysis", "3.12").await?;
//!     conda.clone_env("analysis", "analysis-backup").await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod environment;
pub mod error;
pub mod execution;
pub mod monitoring;
pub mod server;

#[cfg(all(test, unix))]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::Settings;
pub use environment::{Conda, EnvInfo};
pub use error::CondaError;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "CondaKeeper";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_reexport_builds_client() {
        let settings = Settings {
            conda_exe: Some("/opt/conda/bin/conda".into()),
            ..Settings::default()
        };
        let conda: Conda = settings.conda();
        assert_eq!(conda.executable(), std::path::Path::new("/opt/conda/bin/conda"));
    }

    #[test]
    fn test_error_reexport_classifies_client_errors() {
        assert!(CondaError::InvalidName(".x".into()).is_client_error());
        assert!(!CondaError::Timeout(120).is_client_error());
    }

    #[test]
    fn test_module_exports_conda() {
        let conda = Conda::new("conda");
        assert_eq!(conda.executable(), std::path::Path::new("conda"));
    }
}
