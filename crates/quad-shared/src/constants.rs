/// Application name
pub const APP_NAME: &str = "Quad";

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Database file name inside the data directory
pub const DATABASE_FILE: &str = "quad.db";

/// Default page size for member listings
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Outbound queue depth per live connection
pub const DEFAULT_SESSION_BUFFER: usize = 64;
