use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use depwarden_executor::{DEFAULT_LOCKFILE_NAME, DEFAULT_MAX_BATCH_SIZE, DEFAULT_PROGRAM};
use tracing_subscriber::EnvFilter;

mod dispatch;
mod pipeline;
mod render;

use dispatch::run_cli;

#[derive(Parser, Debug)]
#[command(name = "depwarden")]
#[command(about = "Policy-governed, conflict-aware dependency upgrades", long_about = None)]
struct Cli {
    /// Project directory holding pyproject.toml and the lockfile.
    #[arg(long, global = true, default_value = ".")]
    project_root: PathBuf,
    /// Policy file; defaults to configs/dependency-policy.toml under the project root.
    #[arg(long, global = true)]
    policy: Option<PathBuf>,
    #[arg(long, global = true, default_value = DEFAULT_LOCKFILE_NAME)]
    lockfile: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect the policy or check a package against it.
    Policy {
        #[command(subcommand)]
        command: PolicyCommands,
    },
    /// Analyze declared and locked constraints for version conflicts.
    Conflicts {
        #[arg(long)]
        pyproject: Option<PathBuf>,
        /// Ignore the lockfile even when present.
        #[arg(long)]
        no_lock: bool,
        /// Fold proposed upgrades (`name@version`) into the analysis.
        #[arg(long = "candidate")]
        candidates: Vec<String>,
        #[arg(long)]
        aggressive: bool,
        #[arg(long)]
        json: bool,
    },
    /// Screen, analyze and apply upgrades with checkpoints and rollback.
    Upgrade(UpgradeArgs),
    /// List the checkpoints recorded for this project.
    Checkpoints {
        #[arg(long)]
        backup_dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum PolicyCommands {
    Show {
        #[arg(long)]
        json: bool,
    },
    Check {
        package: String,
        /// Version to check; with `--current`, the upgrade target.
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        current: Option<String>,
    },
}

#[derive(Args, Debug)]
struct UpgradeArgs {
    /// Packages to upgrade, as `name@version` or a bare `name` for latest.
    #[arg(required = true)]
    specs: Vec<String>,
    #[arg(long)]
    pyproject: Option<PathBuf>,
    #[arg(long, default_value_t = DEFAULT_MAX_BATCH_SIZE)]
    batch_size: usize,
    #[arg(long)]
    no_health_checks: bool,
    #[arg(long)]
    no_rollback: bool,
    /// Screen and analyze only; nothing is executed.
    #[arg(long)]
    dry_run: bool,
    #[arg(long, default_value = DEFAULT_PROGRAM)]
    program: String,
    #[arg(long)]
    backup_dir: Option<PathBuf>,
    /// Write the JSON report here instead of stdout.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    run_cli(Cli::parse())
}
