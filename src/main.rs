mod config;
mod db;
mod frame;
mod routes;
mod services;
mod state;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use services::store::{MemoryRoomStore, PgRoomStore, RoomStore};

/// Longest we wait for queued timer snapshots after the server stops.
const PERSIST_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::AppConfig::from_env().expect("invalid configuration");

    let store: Arc<dyn RoomStore> = if let Some(database_url) = &config.database_url {
        let pool = db::init_pool(database_url).await.expect("database init failed");
        Arc::new(PgRoomStore::new(pool))
    } else if let Some(path) = &config.rooms_file {
        let json = std::fs::read_to_string(path).expect("failed to read ROOMS_FILE");
        let store = MemoryRoomStore::from_json(&json).expect("invalid ROOMS_FILE");
        info!(%path, "DATABASE_URL not set; using in-memory room store seeded from file");
        Arc::new(store)
    } else {
        warn!("DATABASE_URL not set; using empty in-memory room store");
        Arc::new(MemoryRoomStore::new())
    };

    let (persist_tx, persist_worker) =
        services::persistence::spawn_timer_persistence_worker(store.clone(), config.timer_persist_queue_capacity);

    let port = config.port;
    let state = state::AppState::new(config, store).with_timer_persistence(persist_tx);

    // Owned by the shutdown future only, so no persistence sender outlives `serve`.
    let shutdown = Arc::clone(&state.shutdown);
    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    info!(%port, "roomsync listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.send_replace(true);
        })
        .await
        .expect("server failed");

    // Connections saw the shutdown flag and dropped their state; let the worker drain.
    if tokio::time::timeout(PERSIST_DRAIN_TIMEOUT, persist_worker).await.is_err() {
        warn!("timer persistence worker did not drain before shutdown");
    }
    info!("roomsync stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
