//! Environment Management Module
//!
//! Everything that talks to conda: finding the executable, running it,
//! cleaning up its output, and exporting environments.

pub mod conda;
pub mod export;
pub mod locate;
pub mod sanitize;

pub use conda::{Conda, EnvInfo, StreamingCommand};
pub use export::{export_env, ExportOptions, ExportOutcome};
pub use locate::{locate_conda, DETECTED_CONDA};
pub use sanitize::is_valid_env_name;
