// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! The capture/storage/upload/health process. Owns every camera worker
//! and the two IPC sockets the portal talks to.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sai_cam::capture::CaptureCoordinator;
use sai_cam::config::Config;
use sai_cam::control::ControlServer;
use sai_cam::health::{CameraHealthRegistry, HealthMonitor};
use sai_cam::health::ipc::IpcServer as HealthIpcServer;
use sai_cam::storage::{queue, StorageManager, UploadQueue};
use sai_cam::upload::UploadWorker;

const HEALTH_SOCKET: &str = "/run/sai-cam/health.sock";
const CONTROL_SOCKET: &str = "/run/sai-cam/control.sock";
const BACKLOG_POLL: Duration = Duration::from_secs(2);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Parser)]
#[command(name = "sai-cam-agent", version)]
struct Cli {
    #[arg(short, long, default_value = "/etc/sai-cam/config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the agent until terminated (the default when no subcommand is given).
    Run,
    /// Load config and storage, print a one-shot status snapshot, and exit.
    Status,
    /// List captured images for one camera.
    List {
        #[arg(long)]
        camera: String,
    },
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

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config, cli.config).await,
        Command::Status => status(config).await,
        Command::List { camera } => list(config, &camera).await,
    }
}

async fn status(config: Config) -> Result<()> {
    let storage = StorageManager::new(&config.storage).context("opening storage")?;
    let total = storage.total_bytes().unwrap_or(0);
    println!("device: {}", config.device.id);
    println!("cameras configured: {}", config.cameras.len());
    println!("storage root: {}", config.storage.base_path.display());
    println!("storage used: {total} bytes");
    Ok(())
}

async fn list(config: Config, camera: &str) -> Result<()> {
    let storage = StorageManager::new(&config.storage).context("opening storage")?;
    let images = storage.list_pending(camera).unwrap_or_default();
    for image in images {
        println!("{}\t{}", image.captured_at, image.filename);
    }
    Ok(())
}

async fn run(config: Config, config_path: PathBuf) -> Result<()> {
    sai_cam::portal::reload::write_pid_file().context("writing agent pid file")?;

    let storage = Arc::new(StorageManager::new(&config.storage).context("opening storage")?);

    let mut upload_queue = UploadQueue::new();
    let upload_tx = upload_queue.sender();
    let rehydrated = upload_queue.rehydrate(&config.storage.base_path).await.unwrap_or(0);
    info!(rehydrated, "upload queue rehydrated");

    let health_registry = CameraHealthRegistry::new();
    let mut coordinator = CaptureCoordinator::new(storage.clone(), upload_tx.clone(), &config, health_registry.clone());
    coordinator.start(&config).await.context("starting camera workers")?;

    let (backlog_tx, backlog_rx) = sai_cam::health::monitor::backlog_watch();
    let (health_monitor, health_cache) = HealthMonitor::new(
        health_registry,
        storage.clone(),
        Duration::from_secs(config.monitoring.health_check_interval_secs),
        Some(backlog_rx),
    );

    let cancel = CancellationToken::new();

    let monitor_cancel = cancel.clone();
    let monitor_handle = tokio::spawn(async move { health_monitor.run(monitor_cancel).await });

    let backlog_sender = upload_tx.clone();
    let backlog_cancel = cancel.clone();
    let backlog_handle = tokio::spawn(async move {
        loop {
            let _ = backlog_tx.send(queue::backlog_len(&backlog_sender));
            tokio::select! {
                _ = tokio::time::sleep(BACKLOG_POLL) => {}
                _ = backlog_cancel.cancelled() => break,
            }
        }
    });

    let cleanup_storage = storage.clone();
    let cleanup_cancel = cancel.clone();
    let cleanup_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(CLEANUP_INTERVAL) => {
                    if let Err(e) = cleanup_storage.cleanup() {
                        error!(error = %e, "storage cleanup pass failed");
                    }
                }
                _ = cleanup_cancel.cancelled() => break,
            }
        }
    });

    let health_ipc = HealthIpcServer::new(HEALTH_SOCKET, health_cache);
    let health_ipc_cancel = cancel.clone();
    let health_ipc_handle = tokio::spawn(async move {
        if let Err(e) = health_ipc.run(health_ipc_cancel).await {
            error!(error = %e, "health IPC server exited");
        }
    });

    let shared_config = Arc::new(RwLock::new(config.clone()));
    let wifi_ap_enabled = Arc::new(RwLock::new(false));
    let control_server = ControlServer::new(
        CONTROL_SOCKET,
        coordinator.command_registry(),
        shared_config.clone(),
        config_path.clone(),
        wifi_ap_enabled,
    );
    let control_cancel = cancel.clone();
    let control_handle = tokio::spawn(async move {
        if let Err(e) = control_server.run(control_cancel).await {
            error!(error = %e, "control IPC server exited");
        }
    });

    let upload_worker = UploadWorker::new(config.server.clone(), &config.advanced, storage.clone());
    let (requeue_tx, mut requeue_rx) = tokio::sync::mpsc::channel(1024);
    let worker_upload_tx = upload_tx.clone();
    let requeue_forward_cancel = cancel.clone();
    let requeue_forward_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(item) = requeue_rx.recv() => {
                    let _ = worker_upload_tx.send(item).await;
                }
                _ = requeue_forward_cancel.cancelled() => break,
            }
        }
    });

    let upload_cancel = cancel.clone();
    let upload_rx = upload_queue.into_receiver();
    let upload_handle = tokio::spawn(async move {
        upload_worker.run(upload_rx, requeue_tx, upload_cancel).await;
    });

    info!("sai-cam agent started");

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining");
    cancel.cancel();

    coordinator.shutdown().await;
    let _ = tokio::join!(
        monitor_handle,
        backlog_handle,
        cleanup_handle,
        health_ipc_handle,
        control_handle,
        requeue_forward_handle,
        upload_handle,
    );

    let _ = std::fs::remove_file("/run/sai-cam/agent.pid");
    info!("sai-cam agent stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}
