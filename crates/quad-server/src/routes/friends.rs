use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use quad_shared::types::BlockAction;
use quad_shared::UserId;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::error::{ApiJson, ApiPath, ServerError};
use crate::routes::message;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/send-request", post(send_request))
        .route("/accept-request", post(accept_request))
        .route("/block-unblock", post(block_unblock))
        .route("/can-chat", post(can_chat))
        .route("/{user_id}", get(list_friends))
        .route("/{user_id}/requests", get(list_requests))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairRequest {
    user_id: UserId,
    friend_id: UserId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockRequest {
    user_id: UserId,
    target_id: UserId,
    action: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CanChatRequest {
    user_a: UserId,
    user_b: UserId,
}

async fn send_request(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PairRequest>,
) -> Result<Json<Value>, ServerError> {
    state
        .store
        .call(move |db| db.send_friend_request(req.user_id, req.friend_id))
        .await?;
    Ok(message("Friend request sent."))
}

/// `userId` is the accepter, `friendId` the original requester.
async fn accept_request(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PairRequest>,
) -> Result<Json<Value>, ServerError> {
    state
        .store
        .call(move |db| db.accept_friend_request(req.user_id, req.friend_id))
        .await?;
    Ok(message("Friend request accepted."))
}

async fn block_unblock(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BlockRequest>,
) -> Result<Json<Value>, ServerError> {
    let action: BlockAction = req
        .action
        .parse()
        .map_err(|_| ServerError::BadRequest("Invalid action.".to_string()))?;

    state
        .store
        .call(move |db| db.set_block(req.user_id, req.target_id, action.is_block()))
        .await?;

    Ok(message(if action.is_block() {
        "User blocked successfully."
    } else {
        "User unblocked successfully."
    }))
}

async fn can_chat(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CanChatRequest>,
) -> Result<Response, ServerError> {
    let allowed = state
        .store
        .call(move |db| db.can_communicate(req.user_a, req.user_b))
        .await?;

    if allowed {
        Ok(Json(json!({ "canChat": true })).into_response())
    } else {
        Ok((
            StatusCode::FORBIDDEN,
            Json(json!({ "canChat": false, "message": "Chat not allowed" })),
        )
            .into_response())
    }
}

async fn list_friends(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserId>,
) -> Result<Json<Value>, ServerError> {
    let friends = state.store.call(move |db| db.list_friends(user_id)).await?;
    Ok(Json(json!({ "friends": friends })))
}

async fn list_requests(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserId>,
) -> Result<Json<Value>, ServerError> {
    let requests = state
        .store
        .call(move |db| db.list_incoming_requests(user_id))
        .await?;
    Ok(Json(json!({ "requests": requests })))
}
