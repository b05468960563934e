//! aqea-master - AQEA extraction coordinator service
//!
//! Reads the `[master]` section of the config file, creates the work plan,
//! and serves the coordination API until interrupted. Exit codes: 0 normal,
//! 1 config error, 2 unsupported language, 3 store initialization failed.

use std::process::ExitCode;

use tracing::{error, info};

use aqea_common::store::{open_with_fallback, CoordinationStore};
use aqea_common::{config::Config, Error};
use aqea_master::{build_router, plan::build_work_units, status::build_snapshot, sweep, AppState};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!(
        "Starting AQEA master coordinator v{}",
        env!("CARGO_PKG_VERSION")
    );

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
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

async fn run() -> aqea_common::Result<()> {
    let config_path = Config::resolve_path(std::env::args().nth(1).as_deref());
    let config = Config::load(&config_path)?;
    let master_config = config
        .master
        .ok_or_else(|| Error::Config(format!("no [master] section in {}", config_path.display())))?;

    let store = open_with_fallback(&master_config.store).await?;

    let units = build_work_units(
        &master_config.plan,
        &master_config.source,
        master_config.max_retries,
    );
    let total_estimated: i64 = units.iter().map(|u| u.estimated_entries).sum();
    store.create_work_units(&units).await?;
    info!(
        count = units.len(),
        total_estimated,
        language = %master_config.plan.language_code,
        source = %master_config.source,
        "work plan ready"
    );

    let state = AppState::new(store, &master_config, total_estimated);
    sweep::spawn_sweep(
        state.clone(),
        std::time::Duration::from_secs(master_config.sweep_interval_secs),
    );
    sweep::spawn_status_log(state.clone());

    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&master_config.bind_addr).await?;
    info!("listening on http://{}", master_config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Final snapshot for the operator before the process ends.
    match build_snapshot(&state).await {
        Ok(snapshot) => info!(
            processed = snapshot.progress.total_processed_entries,
            completed_units = snapshot.work_units.completed,
            failed_units = snapshot.work_units.failed,
            soft_errors = snapshot.errors.soft_errors,
            "final status"
        ),
        Err(e) => error!(error = %e, "could not assemble final snapshot"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install shutdown handler");
        return;
    }
    info!("shutdown requested");
}
