use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;

use cp_sync::app::ControlPlaneBuilder;
use cp_sync::CpSyncConfig;
use cp_sync::Result;
use cp_sync::StorageError;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<()> {
    let mut settings = CpSyncConfig::new()?;
    if let Some(path) = std::env::args().nth(1) {
        settings = settings.with_override_config(&path)?;
    }
    let settings = settings.validate()?;

    // Initializing Logs
    let _guard = init_observability(&settings.cluster.log_dir)?;
    info!(config = ?settings, "starting control plane");

    // Initializing Shutdown Signal
    let cancel = CancellationToken::new();

    let control_plane = ControlPlaneBuilder::new(settings, cancel.clone()).build()?;

    info!("Application started. Waiting for CTRL+C signal...");
    tokio::spawn(graceful_shutdown(cancel));

    if let Err(e) = control_plane.run().await {
        error!("control plane stops: {:?}", e);
        return Err(e);
    }

    info!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(cancel: CancellationToken) {
    let (mut sigint, mut sigterm) = match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(e), _) | (_, Err(e)) => {
            error!("failed to install signal handlers: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    info!("Shutdown server..");
    cancel.cancel();
}

fn open_file_for_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn init_observability(log_dir: &Path) -> Result<WorkerGuard> {
    let log_file = open_file_for_append(&log_dir.join("cp-sync.log")).map_err(StorageError::IoError)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
