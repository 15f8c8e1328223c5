//! Environment Export
//!
//! Produces a portable `environment.yml` from `conda env export` and a
//! Markdown guide explaining how to recreate the environment from it.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use super::conda::Conda;
use super::sanitize::remove_ansi;
use crate::error::{CondaError, Result};

/// Default YAML output file.
pub const DEFAULT_YML_FILE: &str = "environment.yml";

/// Default guide output file.
pub const DEFAULT_MD_FILE: &str = "environment_guide.md";

/// Where raw output goes when it cannot be parsed.
pub const DEBUG_RAW_OUTPUT: &str = "debug_raw_output.txt";

const GUIDE_MARKDOWN: &str = "\
# Using the exported environment YAML

Write a small test script after creating the environment to confirm that
everything installed correctly.

## How to use

1. Make sure Anaconda or Miniconda is installed.
2. Create the environment: `conda env create -f {yml_file}` (replace `{yml_file}` with the actual file name).
3. Activate it: `conda activate {env_name}` (replace `{env_name}` with the environment name).

## Common reasons creation fails

| Cause | Typical symptom | Fix |
|-------|-----------------|-----|
| Package version conflict | UnsatisfiableError | Raise or lower the conflicting versions, or change the Python version |
| Incompatible Python version | requires a different python version | Adjust the python pin in the YAML or choose compatible package versions |
| Wrong channel for special packages | No matching distribution | Install PyTorch/Paddle and similar packages from their official channels |
| Network problems | Stuck at Solving environment | Switch to a closer mirror |
| Invalid YAML | Invalid YAML | Check indentation and formatting |
| Platform mismatch | No matching distribution | Confirm the packages support this OS and architecture (e.g. ARM/M1) |
";

/// What to export and where to write it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ExportOptions {
    /// Environment to export; `None` exports the active one.
    pub env_name: Option<String>,
    pub output_file: PathBuf,
    pub output_md: PathBuf,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            env_name: None,
            output_file: PathBuf::from(DEFAULT_YML_FILE),
            output_md: PathBuf::from(DEFAULT_MD_FILE),
        }
    }
}

/// Result of a successful export.
#[derive(Serialize, Debug, Clone)]
pub struct ExportOutcome {
    pub yml_file: PathBuf,
    pub md_file: PathBuf,
    pub yml_content: String,
    pub message: String,
}

/// Strips a channel URL or name down to its comparable form.
fn normalize_channel(channel: &str) -> &str {
    channel.trim_end_matches('/')
}

/// Removes duplicate channels, keeping the first spelling of each.
pub fn deduplicate_channels(channels: &[Value]) -> Vec<Value> {
    let mut seen = HashSet::new();
    channels
        .iter()
        .filter(|ch| match ch.as_str() {
            Some(name) => seen.insert(normalize_channel(name).to_string()),
            None => true,
        })
        .cloned()
        .collect()
}

/// Cleans `conda env export` output into a portable document.
///
/// ANSI codes are removed, channels deduplicated, and the machine-specific
/// `prefix` key dropped.
pub fn clean_export(raw: &str) -> std::result::Result<Value, serde_yaml::Error> {
    let mut doc: Value = serde_yaml::from_str(&remove_ansi(raw))?;

    if let Some(map) = doc.as_mapping_mut() {
        tidy_mapping(map);
    }
    Ok(doc)
}

fn tidy_mapping(map: &mut Mapping) {
    if let Some(Value::Sequence(channels)) = map.get_mut("channels") {
        *channels = deduplicate_channels(channels);
    }
    map.remove("prefix");
}

/// Serialises a cleaned document as block-style YAML.
pub fn render_yaml(doc: &Value) -> Result<String> {
    serde_yaml::to_string(doc).map_err(|e| CondaError::Parse(e.to_string()))
}

/// Writes the usage guide.
pub fn write_guide(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, GUIDE_MARKDOWN)?;
    Ok(())
}

/// Exports an environment to YAML and writes the accompanying guide.
pub async fn export_env(conda: &Conda, options: &ExportOptions) -> Result<ExportOutcome> {
    let target = options.env_name.as_deref().unwrap_or("<active>");
    info!("Exporting environment {}", target);

    let raw = conda.export_env_raw(options.env_name.as_deref()).await?;

    let doc = match clean_export(&raw) {
        Ok(doc) => doc,
        Err(e) => {
            let debug_file = options
                .output_file
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.join(DEBUG_RAW_OUTPUT))
                .unwrap_or_else(|| PathBuf::from(DEBUG_RAW_OUTPUT));
            if let Some(parent) = debug_file.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(&debug_file, &raw)?;
            warn!("Export output was not valid YAML, saved to {}", debug_file.display());
            return Err(CondaError::ExportParse {
                message: e.to_string(),
                debug_file,
            });
        }
    };

    let yml_content = render_yaml(&doc)?;

    write_guide(&options.output_md)?;
    if let Some(parent) = options.output_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&options.output_file, &yml_content)?;

    let message = format!(
        "Exported environment to {} | guide: {}",
        options.output_file.display(),
        options.output_md.display()
    );
    info!("{}", message);

    Ok(ExportOutcome {
        yml_file: options.output_file.clone(),
        md_file: options.output_md.clone(),
        yml_content,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "\x1b[32mname: ml\x1b[0m\nchannels:\n  - pytorch\n  - conda-forge/\n  - conda-forge\n  - pytorch/\n  - defaults\ndependencies:\n  - python=3.12.1\n  - numpy=1.26.4\nprefix: /home/u/miniconda3/envs/ml\n";

    #[test]
    fn test_deduplicate_channels_keeps_first_spelling() {
        let channels: Vec<Value> = ["a/", "b", "a", "c", "b/"]
            .iter()
            .map(|s| Value::from(*s))
            .collect();
        let unique = deduplicate_channels(&channels);
        assert_eq!(
            unique,
            vec![Value::from("a/"), Value::from("b"), Value::from("c")]
        );
    }

    #[test]
    fn test_clean_export() {
        let doc = clean_export(RAW).unwrap();
        let map = doc.as_mapping().unwrap();

        assert_eq!(map.get("name"), Some(&Value::from("ml")));
        assert!(map.get("prefix").is_none());

        let channels = map.get("channels").and_then(Value::as_sequence).unwrap();
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[0], Value::from("pytorch"));
        assert_eq!(channels[1], Value::from("conda-forge/"));
    }

    #[test]
    fn test_render_keeps_key_order() {
        let yaml = render_yaml(&clean_export(RAW).unwrap()).unwrap();
        let name = yaml.find("name:").unwrap();
        let channels = yaml.find("channels:").unwrap();
        let deps = yaml.find("dependencies:").unwrap();
        assert!(name < channels && channels < deps);
        assert!(!yaml.contains("prefix"));
        assert!(!yaml.contains('\x1b'));
    }

    #[test]
    fn test_clean_export_rejects_garbage() {
        assert!(clean_export("name: [unclosed\n").is_err());
    }

    #[test]
    fn test_write_guide() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs").join("guide.md");
        write_guide(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("conda env create -f"));
        assert!(content.contains("UnsatisfiableError"));
    }

    #[test]
    fn test_export_options_defaults() {
        let options: ExportOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, ExportOptions::default());
        assert_eq!(options.output_file, PathBuf::from(DEFAULT_YML_FILE));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use crate::testing::FakeConda;

        #[tokio::test]
        async fn test_export_env_writes_files() {
            let fake = FakeConda::new();
            let out = tempfile::tempdir().unwrap();
            let options = ExportOptions {
                env_name: Some("alpha".into()),
                output_file: out.path().join("env.yml"),
                output_md: out.path().join("guide.md"),
            };

            let outcome = export_env(&fake.conda(), &options).await.unwrap();

            assert!(outcome.yml_content.contains("name: alpha"));
            assert!(outcome.yml_content.contains("requests==2.31.0"));
            assert!(!outcome.yml_content.contains("prefix"));
            assert_eq!(fs::read_to_string(&options.output_file).unwrap(), outcome.yml_content);
            assert!(options.output_md.exists());
            assert!(fake
                .calls()
                .iter()
                .any(|c| c == "env export --no-builds --name alpha"));
        }

        #[tokio::test]
        async fn test_export_env_saves_debug_output() {
            let fake = FakeConda::new();
            let out = tempfile::tempdir().unwrap();
            let options = ExportOptions {
                env_name: Some("garbled".into()),
                output_file: out.path().join("env.yml"),
                output_md: out.path().join("guide.md"),
            };

            let err = export_env(&fake.conda(), &options).await.unwrap_err();
            match err {
                CondaError::ExportParse { debug_file, .. } => {
                    assert_eq!(debug_file, out.path().join(DEBUG_RAW_OUTPUT));
                    assert!(fs::read_to_string(debug_file).unwrap().contains("unclosed"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert!(!options.output_file.exists());
        }

        #[tokio::test]
        async fn test_export_env_debug_output_in_new_directory() {
            let fake = FakeConda::new();
            let out = tempfile::tempdir().unwrap();
            let nested = out.path().join("exports").join("today");
            let options = ExportOptions {
                env_name: Some("garbled".into()),
                output_file: nested.join("env.yml"),
                output_md: nested.join("guide.md"),
            };

            match export_env(&fake.conda(), &options).await.unwrap_err() {
                CondaError::ExportParse { debug_file, .. } => {
                    assert_eq!(debug_file, nested.join(DEBUG_RAW_OUTPUT));
                    assert!(fs::read_to_string(debug_file).unwrap().contains("unclosed"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }
}
