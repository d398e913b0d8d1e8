// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! The operator-facing HTTP/SSE process. Holds no mutable camera state;
//! reads the health socket and log file, and relays operator actions to
//! the agent over the control socket.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use sai_cam::config::Config;
use sai_cam::portal::{self, AppState};

#[derive(Parser)]
#[command(name = "sai-cam-portal", version)]
struct Cli {
    #[arg(short, long, default_value = "/etc/sai-cam/config.yaml")]
    config: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let runtime = tokio::runtime::Runtime::new().context("building tokio runtime")?;
    runtime.block_on(async_main(cli))
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = Config::from_file(&cli.config).with_context(|| format!("loading {}", cli.config.display()))?;
    let bind_address = config.portal.bind_address.clone();
    let port = config.portal.port;

    let state = AppState::new(config, cli.config);
    portal::start_server(state, &bind_address, port).await;
    Ok(())
}
