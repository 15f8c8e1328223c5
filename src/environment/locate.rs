//! Conda Executable Discovery
//!
//! The conda binary is resolved in the following order:
//! 1. Explicit override from settings or `--conda`
//! 2. `CONDA_EXE`, which `conda activate` exports
//! 3. Derived from the active prefix in `CONDA_PREFIX`
//! 4. Derived from the interpreter in `CONDA_PYTHON_EXE`
//! 5. Bare `conda`, resolved through `PATH` at spawn time

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use once_cell::sync::Lazy;

/// Name used when nothing better is found.
pub const FALLBACK_EXE: &str = "conda";

/// Conda executable detected from the process environment.
pub static DETECTED_CONDA: Lazy<PathBuf> = Lazy::new(|| locate_conda(None));

/// Returns the prefix an interpreter belongs to.
///
/// Windows installs `python.exe` directly in the prefix, Unix installs
/// it under `<prefix>/bin`.
pub fn prefix_of_interpreter(python_exe: &Path, windows: bool) -> Option<PathBuf> {
    let parent = python_exe.parent()?;
    if windows {
        return Some(parent.to_path_buf());
    }
    match parent.file_name() {
        Some(name) if name == "bin" => parent.parent().map(Path::to_path_buf),
        _ => Some(parent.to_path_buf()),
    }
}

/// Returns the conda executable belonging to a prefix.
///
/// A prefix of the form `<root>/envs/<name>` is a named environment; its
/// conda lives in `<root>`. Any other prefix is treated as the root itself.
pub fn conda_exe_from_prefix(prefix: &Path, windows: bool) -> PathBuf {
    let root = match prefix.parent() {
        Some(parent) if parent.file_name().map_or(false, |n| n == "envs") => {
            parent.parent().unwrap_or(parent)
        }
        _ => prefix,
    };

    if windows {
        root.join("Scripts").join("conda.exe")
    } else {
        root.join("bin").join("conda")
    }
}

/// Resolves the conda executable from the real process environment.
pub fn locate_conda(override_path: Option<&Path>) -> PathBuf {
    locate_with(
        override_path,
        |key| std::env::var_os(key),
        |path| path.exists(),
        cfg!(windows),
    )
}

fn locate_with<V, E>(override_path: Option<&Path>, var: V, exists: E, windows: bool) -> PathBuf
where
    V: Fn(&str) -> Option<OsString>,
    E: Fn(&Path) -> bool,
{
    if let Some(path) = override_path {
        info!("Using configured conda: {}", path.display());
        return path.to_path_buf();
    }

    if let Some(exe) = var("CONDA_EXE").map(PathBuf::from) {
        if exists(&exe) {
            info!("Using conda from CONDA_EXE: {}", exe.display());
            return exe;
        }
        debug!("CONDA_EXE points at missing file: {}", exe.display());
    }

    if let Some(prefix) = var("CONDA_PREFIX").map(PathBuf::from) {
        let candidate = conda_exe_from_prefix(&prefix, windows);
        if exists(&candidate) {
            info!("Using conda from active prefix: {}", candidate.display());
            return candidate;
        }
        debug!("No conda under prefix: {}", candidate.display());
    }

    if let Some(python) = var("CONDA_PYTHON_EXE").map(PathBuf::from) {
        if let Some(prefix) = prefix_of_interpreter(&python, windows) {
            let candidate = conda_exe_from_prefix(&prefix, windows);
            if exists(&candidate) {
                info!("Using conda next to interpreter: {}", candidate.display());
                return candidate;
            }
            debug!("No conda next to interpreter: {}", candidate.display());
        }
    }

    warn!("Conda location not detected, relying on PATH");
    PathBuf::from(FALLBACK_EXE)
}
