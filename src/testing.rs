//! Test Fixtures
//!
//! A scripted stand-in for the conda executable so the client, the task
//! runner and the HTTP handlers can be exercised without a real install.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::environment::Conda;

const FAKE_CONDA: &str = r#"#!/bin/sh
ROOT='__ROOT__'
echo "$*" >> "$ROOT/calls.log"
case "$1" in
  env)
    case "$2" in
      list)
        printf '\357\273\277{"envs": ["%s", "%s/envs/alpha", "%s/envs/beta"]}\n' "$ROOT" "$ROOT" "$ROOT"
        echo "==> WARNING: A newer version of conda exists. <=="
        ;;
      remove)
        if [ "$4" = "broken" ]; then
          echo "EnvironmentLocationNotFound: Not a conda environment: broken" >&2
          exit 1
        fi
        echo "Remove all packages in environment $ROOT/envs/$4:"
        ;;
      export)
        if [ "$5" = "garbled" ]; then
          printf 'name: [unclosed\n'
          exit 0
        fi
        printf '\033[32mname: alpha\033[0m\nchannels:\n  - conda-forge\n  - conda-forge/\n  - defaults\ndependencies:\n  - python=3.11.4\n  - pip:\n    - requests==2.31.0\nprefix: /opt/conda/envs/alpha\n'
        ;;
    esac
    ;;
  create)
    if [ "$3" = "broken" ]; then
      echo "PackagesNotFoundError: The following packages are not available" >&2
      exit 1
    fi
    if [ "$4" = "--clone" ]; then
      echo "Source:      $ROOT/envs/$5"
      echo "Destination: $ROOT/envs/$3"
      echo "Copying packages..."
      echo "Linking python"
      echo "Linking pip"
      echo "Linking wheel"
    else
      echo "Collecting package metadata (current_repodata.json): done"
      echo "Solving environment: done"
      echo "Downloading and Extracting Packages"
      echo "Preparing transaction: done"
      echo "Verifying transaction: done" >&2
      echo "Executing transaction: done"
    fi
    ;;
  info)
    printf '# conda environments:\n#\nbase                  *  %s\nalpha                    %s/envs/alpha\nbeta                     %s/envs/beta\n\n' "$ROOT" "$ROOT" "$ROOT"
    ;;
  sleep)
    sleep 5
    ;;
esac
exit 0
"#;

/// A temporary conda root with two environments and a scripted executable.
///
/// `alpha` has a Python 3.11.4 interpreter, `beta` has none. Any command
/// naming an environment called `broken` fails.
pub struct FakeConda {
    dir: TempDir,
}

impl FakeConda {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();

        let alpha_bin = root.join("envs").join("alpha").join("bin");
        fs::create_dir_all(&alpha_bin).expect("alpha env");
        fs::create_dir_all(root.join("envs").join("beta")).expect("beta env");
        fs::create_dir_all(root.join("bin")).expect("bin dir");

        write_executable(&alpha_bin.join("python"), "#!/bin/sh\necho \"Python 3.11.4\"\n");
        let script = FAKE_CONDA.replace("__ROOT__", &root.display().to_string());
        write_executable(&root.join("bin").join("conda"), &script);

        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn exe(&self) -> PathBuf {
        self.root().join("bin").join("conda")
    }

    pub fn conda(&self) -> Conda {
        Conda::new(self.exe())
    }

    /// Argument lists the fake executable has been invoked with.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.root().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn write_executable(path: &Path, content: &str) {
    fs::write(path, content).expect("write script");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod");
    }
}
