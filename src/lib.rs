pub mod apply;
pub mod bootstrap;
pub mod candidate;
pub mod class_tokens;
pub mod classify;
pub mod config;
pub mod error;
pub mod graph;
pub mod layer;
pub mod project;
pub mod scanner;
pub mod stylesheet;
pub mod tailwind_directives;
pub mod utility;

use clap::Parser;
use std::path::PathBuf;

pub use error::{Result, UpgradeError, Warning};
pub use project::{Project, Report};

/// Config file picked up from the project root when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "ironframe-upgrade.toml";

/// Upgrade a Tailwind CSS v3 project's stylesheets and templates to v4.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "ironframe-upgrade", version)]
pub struct Command {
    /// Project root.
    #[arg(short = 'C', long = "cwd", value_name = "DIR", default_value = ".")]
    pub root: PathBuf,
    /// Resolved project config (TOML).
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Report what would change without writing anything.
    #[arg(long)]
    pub dry_run: bool,
    /// Entry stylesheets, relative to the project root.
    #[arg(value_name = "STYLESHEET")]
    pub stylesheets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliError {
    pub message: String,
}

impl From<UpgradeError> for CliError {
    fn from(err: UpgradeError) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

pub fn run(command: Command) -> std::result::Result<(), CliError> {
    let config = match &command.config {
        Some(path) => config::load(path).map_err(UpgradeError::from)?,
        None => {
            let default = command.root.join(DEFAULT_CONFIG_FILE);
            if default.is_file() {
                config::load(&default).map_err(UpgradeError::from)?
            } else {
                config::Config::default()
            }
        }
    };

    let project = Project::load(&command.root, config, &command.stylesheets)?;
    let report = project.upgrade()?;

    if command.dry_run {
        for change in &report.changes {
            let action = if change.created { "create" } else { "update" };
            eprintln!("would {} {}", action, change.path.display());
        }
    } else {
        report.commit(&command.root)?;
    }

    eprintln!("{}", report.summary());
    Ok(())
}

pub fn run_from_env() -> std::result::Result<(), CliError> {
    run(Command::parse())
}

pub fn parse_args<I>(args: I) -> std::result::Result<Command, CliError>
where
    I: IntoIterator<Item = String>,
{
    let args = std::iter::once("ironframe-upgrade".to_string()).chain(args);
    Command::try_parse_from(args).map_err(|err| CliError {
        message: err.to_string(),
    })
}
