//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use quad_shared::constants::{DEFAULT_HTTP_PORT, DEFAULT_SESSION_BUFFER};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP and WebSocket listener.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file. `None` means the platform data directory.
    /// Env: `DATABASE_PATH`
    pub database_path: Option<PathBuf>,

    /// Origin allowed by CORS. `None` allows any origin without credentials.
    /// Env: `FRONTEND_URL`
    pub frontend_url: Option<String>,

    /// Mark a user offline when their last live connection closes.
    /// Env: `OFFLINE_ON_DISCONNECT` (true/false)
    /// Default: `true`
    pub offline_on_disconnect: bool,

    /// Outbound queue depth of each live connection.
    /// Env: `SESSION_BUFFER`
    /// Default: `64`
    pub session_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            frontend_url: None,
            offline_on_disconnect: true,
            session_buffer: DEFAULT_SESSION_BUFFER,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = lookup("DATABASE_PATH").filter(|p| !p.is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Some(url) = lookup("FRONTEND_URL").filter(|u| !u.is_empty()) {
            config.frontend_url = Some(url);
        }

        if let Some(val) = lookup("OFFLINE_ON_DISCONNECT") {
            config.offline_on_disconnect = val != "false" && val != "0";
        }

        if let Some(val) = lookup("SESSION_BUFFER") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.session_buffer = n,
                _ => tracing::warn!(value = %val, "Invalid SESSION_BUFFER, using default"),
            }
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }
}
