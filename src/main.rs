use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use parkhold::clock::SystemClock;
use parkhold::config::Config;
use parkhold::engine::Engine;
use parkhold::store::{LogStore, SlotStore};
use parkhold::{http, observability, sweeper};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    observability::init(config.metrics_port)?;

    let shutdown = CancellationToken::new();
    let mut background = Vec::new();

    let store: Arc<dyn SlotStore> = if config.in_memory {
        Arc::new(LogStore::in_memory(config.seed.as_slice())?)
    } else {
        std::fs::create_dir_all(&config.data_dir)?;
        let store = Arc::new(LogStore::open(&config.wal_path(), config.seed.as_slice())?);
        background.push(tokio::spawn(sweeper::run_compactor(
            store.clone(),
            config.compact_threshold,
            shutdown.clone(),
        )));
        store
    };

    let engine = Arc::new(Engine::new(store, Arc::new(SystemClock)));
    let held = engine.sync_held_gauge().await?;

    background.push(tokio::spawn(sweeper::run_sweeper(
        engine.clone(),
        config.sweep_interval,
        shutdown.clone(),
    )));

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("parkhold listening on {addr}");
    info!("  slots: {} ({held} held)", config.seed.len());
    info!(
        "  storage: {}",
        if config.in_memory {
            "in-memory".to_string()
        } else {
            config.wal_path().display().to_string()
        }
    );
    info!("  sweep interval: {:?}", config.sweep_interval);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, http::routes(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown signal received, stopping background tasks");
    shutdown.cancel();
    for task in background {
        let _ = task.await;
    }

    info!("parkhold stopped");
    Ok(())
}

/// Resolves on SIGTERM or ctrl-c.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {e}");
                ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
