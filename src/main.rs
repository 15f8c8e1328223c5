//! CondaKeeper CLI Entry Point
//!
//! # Usage
//!
//! ```bash
//! # Start the web front-end (opens a browser)
//! condakeeper serve
//!
//! # List environments with their Python versions
//! condakeeper list
//!
//! # Create, clone and remove environments
//! condakeeper create analysis --python 3.11
//! condakeeper clone analysis analysis-backup
//! condakeeper remove old-env another-env
//!
//! # Export an environment to environment.yml plus a usage guide
//! condakeeper export --env analysis -o analysis.yml
//! ```

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::debug;

use condakeeper::environment::export::{export_env, ExportOptions, DEFAULT_MD_FILE, DEFAULT_YML_FILE};
use condakeeper::environment::{is_valid_env_name, Conda};
use condakeeper::execution::{Operation, TaskRegistry, TaskRunner, TaskStatus};
use condakeeper::monitoring::ActivityLog;
use condakeeper::{server, CondaError, Settings, APP_NAME, VERSION};

type CliResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// How often the terminal progress line is refreshed.
const PROGRESS_POLL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "condakeeper", version, about = "Manage conda environments from the terminal or a browser")]
struct Cli {
    /// Settings file (defaults to ./condakeeper.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the conda executable
    #[arg(long, global = true)]
    conda: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the web front-end
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Do not open a browser window
        #[arg(long)]
        no_browser: bool,
        /// Directory served under /static
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
    /// List environments (base excluded)
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Only print names, read from `conda info --envs`
        #[arg(long, conflicts_with = "json")]
        names_only: bool,
    },
    /// Create an environment
    Create {
        name: String,
        /// Python version to install
        #[arg(long)]
        python: Option<String>,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Clone an existing environment
    Clone {
        source: String,
        new_name: String,
        #[arg(short, long)]
        yes: bool,
    },
    /// Remove one or more environments
    Remove {
        #[arg(required = true)]
        names: Vec<String>,
        #[arg(short, long)]
        yes: bool,
    },
    /// Export an environment to YAML with a usage guide
    Export {
        /// Environment to export (defaults to the active one)
        #[arg(short, long)]
        env: Option<String>,
        #[arg(short, long, default_value = DEFAULT_YML_FILE)]
        output: PathBuf,
        #[arg(short, long, default_value = DEFAULT_MD_FILE)]
        md_output: PathBuf,
    },
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| match record.level() {
            log::Level::Warn | log::Level::Error => {
                writeln!(buf, "[{}] {}", record.level(), record.args())
            }
            _ => writeln!(buf, "{}", record.args()),
        })
        .init();
}

/// Asks a yes/no question on stdin; anything but `y`/`yes` is a no.
fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Runs an operation in the background and renders its progress.
async fn run_with_progress(conda: &Conda, op: Operation) -> CliResult<()> {
    let runner = TaskRunner::new(conda.clone(), TaskRegistry::new(), ActivityLog::default());
    let id = runner.start(op);

    let mut last_stage = String::new();
    let progress = loop {
        let progress = runner.registry().get(&id);
        if progress.stage != last_stage {
            println!("[{:>3}%] {}", progress.progress, progress.stage.dimmed());
            last_stage = progress.stage.clone();
        }
        if progress.is_finished() {
            break progress;
        }
        tokio::time::sleep(PROGRESS_POLL).await;
    };

    match progress.status {
        TaskStatus::Completed => Ok(()),
        _ => Err(progress.stage.into()),
    }
}

async fn list(conda: &Conda, json: bool, names_only: bool) -> CliResult<()> {
    if names_only {
        for name in conda.info_env_names().await? {
            println!("{}", name);
        }
        return Ok(());
    }

    let envs = conda.list_envs().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&envs)?);
        return Ok(());
    }

    if envs.is_empty() {
        println!("No environments found");
        return Ok(());
    }

    let width = envs.iter().map(|e| e.name.len()).max().unwrap_or(0);
    for env in &envs {
        println!(
            "{:width$}  {:10}  {}",
            env.name.bold(),
            env.python_version,
            env.path.dimmed(),
            width = width
        );
    }
    println!();
    println!("{} environments", envs.len());
    Ok(())
}

async fn create(conda: &Conda, name: String, python: String, yes: bool) -> CliResult<()> {
    if !is_valid_env_name(&name) {
        return Err(CondaError::InvalidName(name).into());
    }
    conda.ensure_absent(&name).await?;

    if !yes && !confirm(&format!("Create environment '{}' with Python {}?", name, python))? {
        println!("Cancelled");
        return Ok(());
    }

    run_with_progress(
        conda,
        Operation::Create {
            name: name.clone(),
            python_version: python,
        },
    )
    .await?;
    println!("{} Environment '{}' created", "✓".green(), name);
    Ok(())
}

async fn clone(conda: &Conda, source: String, new_name: String, yes: bool) -> CliResult<()> {
    let names = conda.env_names().await?;
    if !names.contains(&source) {
        return Err(CondaError::NoSuchEnv(source).into());
    }
    if !is_valid_env_name(&new_name) {
        return Err(CondaError::InvalidName(new_name).into());
    }
    if names.contains(&new_name) {
        return Err(CondaError::AlreadyExists(new_name).into());
    }

    println!("{}", "Do not clone an environment that is currently in use.".dimmed());
    if !yes && !confirm(&format!("Clone '{}' into '{}'?", source, new_name))? {
        println!("Cancelled");
        return Ok(());
    }

    run_with_progress(
        conda,
        Operation::Clone {
            source: source.clone(),
            new_name: new_name.clone(),
        },
    )
    .await?;
    println!("{} Cloned '{}' -> '{}'", "✓".green(), source, new_name);
    Ok(())
}

async fn remove(conda: &Conda, names: Vec<String>, yes: bool) -> CliResult<()> {
    let existing = conda.env_names().await?;
    if let Some(missing) = names.iter().find(|n| !existing.contains(n)) {
        return Err(CondaError::NoSuchEnv(missing.clone()).into());
    }

    if !yes && !confirm(&format!("Permanently remove {}?", names.join(", ")))? {
        println!("Cancelled");
        return Ok(());
    }

    let mut failed = 0;
    for name in &names {
        match run_with_progress(conda, Operation::Remove { name: name.clone() }).await {
            Ok(()) => println!("{} Removed '{}'", "✓".green(), name),
            Err(e) => {
                failed += 1;
                println!("{} Could not remove '{}': {}", "✗".red(), name, e);
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} of {} environments could not be removed", failed, names.len()).into());
    }
    Ok(())
}

async fn export(conda: &Conda, env: Option<String>, output: PathBuf, md_output: PathBuf) -> CliResult<()> {
    if let Some(ref name) = env {
        conda.ensure_exists(name).await?;
    }

    let options = ExportOptions {
        env_name: env,
        output_file: output,
        output_md: md_output,
    };
    let outcome = export_env(conda, &options).await?;
    println!("{} {}", "✓".green(), outcome.message);
    Ok(())
}

/// Main application entry point.
async fn run(cli: Cli) -> CliResult<()> {
    let mut settings = Settings::load(cli.config.as_deref()).map_err(|e| e.to_string())?;
    if cli.conda.is_some() {
        settings.conda_exe = cli.conda;
    }
    debug!("Settings: {:?}", settings);

    if let Command::Serve {
        host,
        port,
        no_browser,
        static_dir,
    } = cli.command
    {
        if let Some(host) = host {
            settings.host = host;
        }
        if let Some(port) = port {
            settings.port = port;
        }
        if let Some(dir) = static_dir {
            settings.static_dir = dir;
        }
        settings.open_browser &= !no_browser;

        println!("{} v{}", APP_NAME, VERSION);
        println!("Web interface: {}", settings.url());
        return server::serve(&settings).await;
    }

    let conda = settings.conda();
    match cli.command {
        Command::Serve { .. } => Ok(()),
        Command::List { json, names_only } => list(&conda, json, names_only).await,
        Command::Create { name, python, yes } => {
            let python = python.unwrap_or_else(|| settings.default_python.clone());
            create(&conda, name, python, yes).await
        }
        Command::Clone {
            source,
            new_name,
            yes,
        } => clone(&conda, source, new_name, yes).await,
        Command::Remove { names, yes } => remove(&conda, names, yes).await,
        Command::Export {
            env,
            output,
            md_output,
        } => export(&conda, env, output, md_output).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create() {
        let cli = Cli::parse_from(["condakeeper", "create", "ml", "--python", "3.11", "-y"]);
        match cli.command {
            Command::Create { name, python, yes } => {
                assert_eq!(name, "ml");
                assert_eq!(python.as_deref(), Some("3.11"));
                assert!(yes);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_export_defaults() {
        let cli = Cli::parse_from(["condakeeper", "export", "--env", "ml"]);
        match cli.command {
            Command::Export { env, output, md_output } => {
                assert_eq!(env.as_deref(), Some("ml"));
                assert_eq!(output, PathBuf::from(DEFAULT_YML_FILE));
                assert_eq!(md_output, PathBuf::from(DEFAULT_MD_FILE));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::parse_from(["condakeeper", "list", "--json", "--conda", "/opt/conda/bin/conda", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.conda, Some(PathBuf::from("/opt/conda/bin/conda")));
    }

    #[test]
    fn test_remove_requires_names() {
        assert!(Cli::try_parse_from(["condakeeper", "remove"]).is_err());
    }

    #[test]
    fn test_names_only_conflicts_with_json() {
        assert!(Cli::try_parse_from(["condakeeper", "list", "--json", "--names-only"]).is_err());
    }
}
