// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! One-shot update controller, invoked periodically by a host timer.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use semver::Version;

use sai_cam::config::Config;
use sai_cam::update::{RunOptions, UpdateController};

const LOCK_PATH: &str = "/run/sai-cam/updater.lock";
const STATE_PATH: &str = "/var/lib/sai-cam/update_state.json";
const WORKING_DIR: &str = "/var/lib/sai-cam/updates";
const INSTALLER_PATH: &str = "/usr/lib/sai-cam/installer";

#[derive(Parser)]
#[command(name = "sai-cam-updater", version)]
struct Cli {
    #[arg(short, long, default_value = "/etc/sai-cam/config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,

    /// Run even if the three-strike guard or the lock would otherwise refuse.
    #[arg(long, global = true)]
    force: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Check the release index and, if configured, fetch/apply an update.
    Check {
        /// Only check and record the result; never fetch or apply.
        #[arg(long)]
        check_only: bool,
    },
    /// Apply a previously staged release (see `apply_immediately: false`).
    ApplyStaged,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let runtime = tokio::runtime::Runtime::new().context("building tokio runtime")?;
    let outcome = runtime.block_on(async_main(cli))?;
    if !outcome {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

async fn async_main(cli: Cli) -> Result<bool> {
    let config = Config::from_file(&cli.config).with_context(|| format!("loading {}", cli.config.display()))?;
    let current_version = Version::parse(env!("CARGO_PKG_VERSION")).context("parsing own package version")?;

    let controller = UpdateController::new(
        PathBuf::from(LOCK_PATH),
        PathBuf::from(STATE_PATH),
        PathBuf::from(WORKING_DIR),
        PathBuf::from(INSTALLER_PATH),
        current_version,
        config,
    );

    match cli.command.unwrap_or(Command::Check { check_only: false }) {
        Command::Check { check_only } => {
            let ran = controller
                .run(RunOptions { force: cli.force, check_only })
                .await
                .context("update run failed")?;
            Ok(ran)
        }
        Command::ApplyStaged => {
            controller.apply_staged().await.context("applying staged release failed")?;
            Ok(true)
        }
    }
}
