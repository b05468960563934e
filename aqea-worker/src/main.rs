//! aqea-worker - AQEA extraction worker process
//!
//! Registers with the master, then polls for work units and runs the
//! extraction pipeline until interrupted. Exit codes: 0 normal, 1 config
//! error, 2 unsupported language, 3 store initialization failed, 130
//! interrupted.

use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::{error, info};

use aqea_common::store::{open_with_fallback, AddressAllocator};
use aqea_common::{config::Config, Error};
use aqea_worker::heartbeat::{spawn_heartbeat, WorkerStatus};
use aqea_worker::master_client::MasterClient;
use aqea_worker::pipeline::WorkerPipeline;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting AQEA extraction worker v{}", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(interrupted) => {
            if interrupted {
                ExitCode::from(130)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(Error::UnsupportedLanguage(lang)) => {
            error!("unsupported language: {lang}");
            ExitCode::from(2)
        }
        Err(Error::StorePersistent(msg)) => {
            error!("store initialization failed: {msg}");
            ExitCode::from(3)
        }
        Err(e) => {
            error!("fatal: {e}");
            ExitCode::from(1)
        }
    }
}

/// Returns whether the worker stopped due to an interrupt.
async fn run() -> aqea_common::Result<bool> {
    let config_path = Config::resolve_path(std::env::args().nth(1).as_deref());
    let config = Config::load(&config_path)?;
    let worker_config = config
        .worker
        .ok_or_else(|| Error::Config(format!("no [worker] section in {}", config_path.display())))?;

    let store = open_with_fallback(&worker_config.store).await?;
    let client = MasterClient::new(&worker_config.master_url)?;

    let registered = client
        .register(worker_config.worker_id.as_deref())
        .await?;
    let worker_id = registered.worker_id;

    let status = Arc::new(RwLock::new(WorkerStatus::default()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let heartbeat = spawn_heartbeat(
        client.clone(),
        worker_id.clone(),
        Arc::clone(&status),
        shutdown_rx.clone(),
    );

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    let pipeline = WorkerPipeline::new(
        worker_id.clone(),
        worker_config,
        Arc::clone(&store),
        client,
        status,
    );
    let result = pipeline.run(shutdown_rx.clone()).await;

    heartbeat.abort();
    match store.allocation_stats().await {
        Ok(stats) => info!(
            addresses_allocated = stats.total_allocated,
            tuples_used = stats.tuples_used,
            "worker stopping"
        ),
        Err(_) => info!("worker stopping"),
    }

    result.map(|_| *shutdown_rx.borrow())
}
