//! Async handle over the synchronous [`Database`].
//!
//! SQLite calls block, so each one runs on tokio's blocking pool. The mutex
//! makes every store operation a short, non-reentrant unit.

use std::sync::{Arc, Mutex};

use quad_store::Database;

use crate::error::ServerError;

#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Database>>,
}

impl Store {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Run `f` against the database on the blocking pool.
    pub async fn call<T, F>(&self, f: F) -> Result<T, ServerError>
    where
        F: FnOnce(&mut Database) -> quad_store::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = db
                .lock()
                .map_err(|_| ServerError::Internal("database lock poisoned".to_string()))?;
            f(&mut guard).map_err(ServerError::from)
        })
        .await
        .map_err(|e| ServerError::Internal(format!("store task failed: {e}")))?
    }
}
