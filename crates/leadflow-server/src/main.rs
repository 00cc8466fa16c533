use anyhow::Context;
use leadflow_ai::extractor_from_settings;
use leadflow_storage::RecordStore;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

mod config;
mod error;
mod handlers;
mod logging;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load_config();
    if let Some(path) = logging::init_logging(&config) {
        info!(event = "log_mirror", path = %path.display());
    }

    let addr: SocketAddr = match config.addr.parse() {
        Ok(value) => value,
        Err(err) => {
            error!(event = "invalid_addr", error = %err, addr = %config.addr);
            return Err(err).context("invalid --addr");
        }
    };
    if !addr.ip().is_loopback() {
        warn!(event = "non_loopback_addr", addr = %addr);
    }

    let store = RecordStore::open(&config.store).context("failed to open record store")?;
    let extractor =
        extractor_from_settings(&config.extractor).context("failed to configure AI extractor")?;
    let storage = store.status();
    let state = AppState::new(store, extractor);

    let app = handlers::router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        event = "server_start",
        addr = %addr,
        backend = %storage.active,
        policy = %storage.policy
    );

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!(event = "server_shutdown");
    };

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(event = "server_error", error = %err);
        return Err(err.into());
    }
    Ok(())
}
