//! Conda Command Client
//!
//! Every operation shells out to the conda executable. This module owns
//! spawning, timeouts, output capture, and turning conda's output into
//! typed values.
//!
//! # Example
//!
//! ```rust,no_run
//! use condakeeper::environment::Conda;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let conda = Conda::detect();
//!     for env in conda.list_envs().await? {
//!         println!("{} (Python {})", env.name, env.python_version);
//!     }
//!     Ok(())
//! }
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::locate::DETECTED_CONDA;
use super::sanitize::{
    env_name_from_path, find_base_path, parse_env_list_json, parse_info_envs_table,
    parse_python_version,
};
use crate::error::{CondaError, Result};

/// Default limit for a single conda invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Limit for `python --version` probes.
const PYTHON_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Label used when an environment has no interpreter.
pub const NO_PYTHON: &str = "No Python";

/// Label used when the interpreter exists but its version could not be read.
pub const UNKNOWN_VERSION: &str = "unknown";

/// A non-base conda environment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EnvInfo {
    pub name: String,
    pub path: String,
    pub python_version: String,
}

/// Client for the conda executable.
#[derive(Debug, Clone)]
pub struct Conda {
    exe: PathBuf,
    timeout: Duration,
}

impl Conda {
    /// Creates a client for a specific executable.
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self {
            exe: exe.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Creates a client for the executable detected from the environment.
    pub fn detect() -> Self {
        Self::new(DETECTED_CONDA.clone())
    }

    /// Sets the per-command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Path of the executable this client runs.
    pub fn executable(&self) -> &Path {
        &self.exe
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.exe);
        cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, err: io::Error) -> CondaError {
        if err.kind() == io::ErrorKind::NotFound {
            CondaError::NotFound(self.exe.clone())
        } else {
            CondaError::Io(err)
        }
    }

    /// Runs conda to completion and returns its stdout.
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        debug!("Running {} {}", self.exe.display(), args.join(" "));

        let child = self
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("conda {} timed out", args.join(" "));
                return Err(CondaError::Timeout(self.timeout.as_secs()));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        error!(
            "conda {} exited with {:?}: {}",
            args.join(" "),
            output.status.code(),
            detail
        );
        Err(CondaError::CommandFailed(detail))
    }

    /// Spawns conda with stdout and stderr merged into one line stream.
    pub fn spawn_streaming(&self, args: &[&str]) -> Result<StreamingCommand> {
        debug!("Streaming {} {}", self.exe.display(), args.join(" "));

        let mut child = self
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx));
        }

        Ok(StreamingCommand { child, lines: rx })
    }

    /// Returns the paths reported by `conda env list --json`.
    async fn env_paths(&self) -> Result<Vec<String>> {
        let output = self.run(&["env", "list", "--json"]).await?;
        parse_env_list_json(&output)
    }

    /// Lists all environments except base, with their Python versions.
    pub async fn list_envs(&self) -> Result<Vec<EnvInfo>> {
        let paths = self.env_paths().await?;
        let base = find_base_path(&paths).map(str::to_string);

        let mut envs = Vec::new();
        for path in paths.iter().filter(|p| Some(p.as_str()) != base.as_deref()) {
            envs.push(EnvInfo {
                name: env_name_from_path(path).to_string(),
                path: path.clone(),
                python_version: probe_python_version(Path::new(path)).await,
            });
        }

        info!("Found {} environments", envs.len());
        Ok(envs)
    }

    /// Lists environment names except base, without probing interpreters.
    pub async fn env_names(&self) -> Result<Vec<String>> {
        let paths = self.env_paths().await?;
        let base = find_base_path(&paths).map(str::to_string);
        Ok(paths
            .iter()
            .filter(|p| Some(p.as_str()) != base.as_deref())
            .map(|p| env_name_from_path(p).to_string())
            .collect())
    }

    /// Lists environment names from the plain-text `conda info --envs` table.
    pub async fn info_env_names(&self) -> Result<Vec<String>> {
        let output = self.run(&["info", "--envs"]).await?;
        Ok(parse_info_envs_table(&output))
    }

    /// Fails with `NoSuchEnv` unless the environment exists.
    pub async fn ensure_exists(&self, name: &str) -> Result<()> {
        if self.env_names().await?.iter().any(|n| n == name) {
            Ok(())
        } else {
            Err(CondaError::NoSuchEnv(name.to_string()))
        }
    }

    /// Fails with `AlreadyExists` if the environment exists.
    pub async fn ensure_absent(&self, name: &str) -> Result<()> {
        if self.env_names().await?.iter().any(|n| n == name) {
            Err(CondaError::AlreadyExists(name.to_string()))
        } else {
            Ok(())
        }
    }

    /// Creates an environment with the given Python version.
    pub async fn create_env(&self, name: &str, python_version: &str) -> Result<()> {
        info!("Creating environment '{}' (Python {})", name, python_version);
        let python = format!("python={}", python_version);
        self.run(&create_args(name, &python)).await?;
        info!("Created environment '{}'", name);
        Ok(())
    }

    /// Clones `source` into a new environment.
    pub async fn clone_env(&self, source: &str, new_name: &str) -> Result<()> {
        info!("Cloning environment '{}' -> '{}'", source, new_name);
        self.run(&clone_args(source, new_name)).await?;
        info!("Cloned environment '{}' -> '{}'", source, new_name);
        Ok(())
    }

    /// Removes an environment.
    pub async fn remove_env(&self, name: &str) -> Result<()> {
        info!("Removing environment '{}'", name);
        self.run(&remove_args(name)).await?;
        info!("Removed environment '{}'", name);
        Ok(())
    }

    /// Removes several environments, continuing past failures.
    pub async fn remove_envs(&self, names: &[String]) -> Vec<(String, Result<()>)> {
        let mut outcomes = Vec::with_capacity(names.len());
        for name in names {
            let result = self.remove_env(name).await;
            if let Err(ref e) = result {
                warn!("Could not remove '{}': {}", name, e);
            }
            outcomes.push((name.clone(), result));
        }
        outcomes
    }

    /// Returns the raw `conda env export --no-builds` output.
    pub async fn export_env_raw(&self, env_name: Option<&str>) -> Result<String> {
        let mut args = vec!["env", "export", "--no-builds"];
        if let Some(name) = env_name {
            args.extend(["--name", name]);
        }
        self.run(&args).await
    }
}

/// Arguments for `conda create` with a Python pin.
pub fn create_args<'a>(name: &'a str, python_spec: &'a str) -> [&'a str; 5] {
    ["create", "--name", name, python_spec, "--yes"]
}

/// Arguments for `conda create --clone`.
pub fn clone_args<'a>(source: &'a str, new_name: &'a str) -> [&'a str; 6] {
    ["create", "--name", new_name, "--clone", source, "--yes"]
}

/// Arguments for `conda env remove`.
pub fn remove_args(name: &str) -> [&str; 5] {
    ["env", "remove", "--name", name, "--yes"]
}

/// A running conda process whose output is consumed line by line.
pub struct StreamingCommand {
    child: Child,
    lines: mpsc::UnboundedReceiver<String>,
}

impl StreamingCommand {
    /// Next output line, or `None` once both streams are closed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Waits for the process to exit.
    pub async fn wait(mut self) -> Result<ExitStatus> {
        Ok(self.child.wait().await?)
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("Stopped reading conda output: {}", e);
                break;
            }
        }
    }
}

/// Interpreter path inside an environment prefix.
pub fn python_exe_in(prefix: &Path) -> PathBuf {
    if cfg!(windows) {
        prefix.join("python.exe")
    } else {
        prefix.join("bin").join("python")
    }
}

/// Reads the Python version of an environment by running its interpreter.
pub async fn probe_python_version(prefix: &Path) -> String {
    let python = python_exe_in(prefix);
    if !python.exists() {
        return NO_PYTHON.to_string();
    }

    let probe = Command::new(&python)
        .arg("--version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    match timeout(PYTHON_PROBE_TIMEOUT, probe).await {
        Ok(Ok(output)) if output.status.success() => {
            parse_python_version(&String::from_utf8_lossy(&output.stdout))
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
        }
        Ok(Ok(_)) => UNKNOWN_VERSION.to_string(),
        Ok(Err(e)) => {
            debug!("Failed to run {}: {}", python.display(), e);
            UNKNOWN_VERSION.to_string()
        }
        Err(_) => {
            debug!("Timed out probing {}", python.display());
            UNKNOWN_VERSION.to_string()
        }
    }
}
