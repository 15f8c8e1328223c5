//! Output Sanitization
//!
//! Conda output is not always clean: JSON may carry a byte order mark or
//! trailing warnings, and text output may contain ANSI colour codes.
//! These helpers turn it into something parseable.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::{CondaError, Result};

static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]").expect("ANSI escape regex"));

static ENV_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("environment name regex"));

/// Shape of `conda env list --json`.
#[derive(Debug, Deserialize)]
struct EnvListOutput {
    #[serde(default)]
    envs: Vec<String>,
}

/// Removes a leading byte order mark.
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// Strips the BOM and surrounding whitespace, then drops anything after the last `}`.
pub fn trim_trailing_noise(text: &str) -> &str {
    let text = strip_bom(text.trim_start()).trim();
    match text.rfind('}') {
        Some(idx) => &text[..=idx],
        None => text,
    }
}

/// Removes ANSI escape sequences such as `\x1b[32m`.
pub fn remove_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Parses `conda env list --json` into the list of environment paths.
pub fn parse_env_list_json(output: &str) -> Result<Vec<String>> {
    let cleaned = trim_trailing_noise(output);
    let parsed: EnvListOutput =
        serde_json::from_str(cleaned).map_err(|e| CondaError::Parse(e.to_string()))?;
    debug!("conda reported {} environments", parsed.envs.len());
    Ok(parsed.envs)
}

/// Picks the base (root) environment out of a list of environment paths.
pub fn find_base_path(paths: &[String]) -> Option<&str> {
    paths
        .iter()
        .find(|p| !p.replace('\\', "/").contains("/envs/"))
        .or_else(|| paths.first())
        .map(String::as_str)
}

/// Returns the environment name, i.e. the last path component.
pub fn env_name_from_path(path: &str) -> &str {
    let sep = if path.contains('\\') { '\\' } else { '/' };
    path.rsplit(sep).next().unwrap_or(path)
}

/// Parses the plain-text table printed by `conda info --envs`.
///
/// Returns sorted names without `base`.
pub fn parse_info_envs_table(output: &str) -> Vec<String> {
    let cleaned = remove_ansi(output);
    let mut names: Vec<String> = cleaned
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| *name != "base")
        .map(str::to_string)
        .collect();
    names.sort();
    names
}

/// Extracts `3.12.1` from `Python 3.12.1`.
pub fn parse_python_version(stdout: &str) -> Option<String> {
    stdout
        .strip_prefix("Python ")?
        .split_whitespace()
        .next()
        .map(str::to_string)
}

/// Checks the naming rules conda environments must follow here.
pub fn is_valid_env_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && ENV_NAME.is_match(name)
}
