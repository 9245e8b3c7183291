//! # quad-store
//!
//! Relational storage for Quad, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection`. Each domain component lives in its own module as
//! an `impl Database` block: the relationship graph, the chat gate derived
//! from it, group membership, the presence registry and the user directory.
//! None of them hold state of their own; the database is the only authority.

pub mod chat_gate;
pub mod database;
pub mod groups;
pub mod migrations;
pub mod models;
pub mod presence;
pub mod relationships;
pub mod users;

mod error;
mod timestamp;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
