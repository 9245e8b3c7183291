//! HTTP request handlers, one module per resource.

pub mod friends;
pub mod groups;
pub mod status;
pub mod users;

use axum::Router;
use serde_json::{json, Value};

use crate::api::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/users", users::router())
        .nest("/friends", friends::router())
        .nest("/groups", groups::router())
        .nest("/status", status::router())
}

/// `{"message": ...}` body used by mutations.
pub(crate) fn message(text: &str) -> axum::Json<Value> {
    axum::Json(json!({ "message": text }))
}
