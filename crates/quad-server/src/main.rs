//! # quad-server
//!
//! Backend for the Quad campus social app.
//!
//! This binary provides:
//! - **Relationship graph**: friend requests, friendships and blocks, plus
//!   the chat gate derived from them
//! - **Group membership** with one active group per user and role-gated
//!   mutation
//! - **Presence**: online/offline/heartbeat state persisted in SQLite and
//!   fanned out to every live WebSocket connection
//! - **REST API** (axum) for all of the above and the user directory

mod api;
mod broadcaster;
mod config;
mod error;
mod routes;
mod store;
mod ws;

use std::sync::Arc;

use quad_shared::constants::APP_NAME;
use quad_store::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::broadcaster::{PresenceBroadcaster, SessionTable};
use crate::config::ServerConfig;
use crate::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,quad_server=debug")),
        )
        .init();

    info!("Starting {} server v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the database (runs pending migrations)
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::open_default()?,
    };
    let store = Store::new(db);

    // -----------------------------------------------------------------------
    // 4. Presence fan-out over an empty session table
    // -----------------------------------------------------------------------
    let broadcaster = PresenceBroadcaster::new(store.clone(), SessionTable::new(), &config);

    let http_addr = config.http_addr;
    let app_state = AppState {
        store,
        broadcaster,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
