use std::path::{Path, PathBuf};

mod check;
mod list;
mod show;
mod terminal;

use anyhow::Context;
use check::Check;
use clap::ArgAction;
use list::List;
use rolecheck::Manifest;
use show::Show;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Manifest file, or a directory of manifest files
    #[arg(short, long, default_value = "rolecheck.toml", global = true)]
    manifest: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        self.command
            .unwrap_or_else(|| Command::Check(Check::default()))
            .run(&self.manifest)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Run the checks declared in the manifest (default)
    ///
    /// Exits with status 2 if any check fails or any role cannot be
    /// compiled.
    Check(Check),

    /// Show the compiled composition of a role
    Show(Show),

    /// List registered components and roles
    List(List),
}

impl Command {
    fn run(self, path: &Path) -> anyhow::Result<()> {
        let manifest = Manifest::load(path)
            .with_context(|| format!("failed to load manifest from {}", path.display()))?;

        match self {
            Self::Check(command) => command.run(&manifest)?,
            Self::Show(command) => command.run(&manifest)?,
            Self::List(command) => command.run(&manifest)?,
        }
        Ok(())
    }
}
