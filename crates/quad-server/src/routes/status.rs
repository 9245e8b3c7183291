//! Presence over plain HTTP.
//!
//! Writes go through the [`PresenceBroadcaster`](crate::broadcaster::PresenceBroadcaster)
//! so live connections see them exactly like socket signals.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use quad_shared::protocol::StatusUpdate;
use quad_shared::UserId;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::broadcaster::PresenceSignal;
use crate::error::{ApiJson, ApiPath, ServerError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/online", post(set_online))
        .route("/offline", post(set_offline))
        .route("/last-active", post(touch_activity))
        .route("/status-message", post(set_status_message))
        .route("/online-users", get(online_users))
        .route("/{user_id}", get(get_status))
}

#[derive(Deserialize)]
struct UserRequest {
    user_id: UserId,
}

#[derive(Deserialize)]
struct StatusMessageRequest {
    user_id: UserId,
    status_message: String,
}

async fn apply_signal(
    state: &AppState,
    user: UserId,
    signal: PresenceSignal,
    text: &str,
) -> Result<Json<Value>, ServerError> {
    let record = state.broadcaster.apply(None, user, signal).await?;
    Ok(Json(json!({
        "message": text,
        "status": StatusUpdate::from(record),
    })))
}

async fn set_online(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<UserRequest>,
) -> Result<Json<Value>, ServerError> {
    apply_signal(&state, req.user_id, PresenceSignal::Online, "User set to online").await
}

async fn set_offline(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<UserRequest>,
) -> Result<Json<Value>, ServerError> {
    apply_signal(&state, req.user_id, PresenceSignal::Offline, "User set to offline").await
}

async fn touch_activity(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<UserRequest>,
) -> Result<Json<Value>, ServerError> {
    apply_signal(&state, req.user_id, PresenceSignal::Heartbeat, "Last active updated").await
}

async fn set_status_message(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<StatusMessageRequest>,
) -> Result<Json<Value>, ServerError> {
    apply_signal(
        &state,
        req.user_id,
        PresenceSignal::StatusMessage(req.status_message),
        "Status message updated",
    )
    .await
}

async fn online_users(State(state): State<AppState>) -> Result<Json<Value>, ServerError> {
    let online = state.store.call(|db| db.list_online()).await?;
    let users: Vec<StatusUpdate> = online.into_iter().map(StatusUpdate::from).collect();
    Ok(Json(json!({ "users": users })))
}

async fn get_status(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserId>,
) -> Result<Json<StatusUpdate>, ServerError> {
    let record = state.store.call(move |db| db.get_status(user_id)).await?;
    Ok(Json(record.into()))
}
