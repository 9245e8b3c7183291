//! User directory endpoints.
//!
//! `POST /users/identity` receives claims the identity provider has already
//! verified. Credential checks never happen here.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use quad_shared::UserId;
use quad_store::{ProfileUpdate, User, UserSearch, VerifiedIdentity};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::AppState;
use crate::error::{ApiJson, ApiPath, ApiQuery, ServerError};
use crate::routes::message;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/identity", post(register_identity))
        .route("/search", get(search_users))
        .route("/activity", post(record_activity))
        .route("/{id}", get(get_user).put(update_user))
        .route("/{id}/profile", get(get_profile))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityRequest {
    user_id: UserId,
}

/// Public view of a user.
#[derive(Serialize)]
struct Profile {
    id: UserId,
    username: String,
    profile_pic_url: Option<String>,
    dept: Option<String>,
    yr: Option<String>,
    status: Option<String>,
    last_online: Option<DateTime<Utc>>,
    member_since: DateTime<Utc>,
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            profile_pic_url: user.profile_pic_url,
            dept: user.dept,
            yr: user.yr,
            status: user.status,
            last_online: user.last_online,
            member_since: user.created_at,
        }
    }
}

async fn register_identity(
    State(state): State<AppState>,
    ApiJson(identity): ApiJson<VerifiedIdentity>,
) -> Result<Json<Value>, ServerError> {
    let user = state
        .store
        .call(move |db| db.upsert_verified_user(&identity))
        .await?;
    Ok(Json(json!({ "user": user })))
}

async fn search_users(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<UserSearch>,
) -> Result<Json<Value>, ServerError> {
    let users = state.store.call(move |db| db.search_users(&filter)).await?;
    Ok(Json(json!({ "users": users })))
}

async fn get_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<Value>, ServerError> {
    let user = state.store.call(move |db| db.get_user(id)).await?;
    Ok(Json(json!({ "user": user })))
}

async fn update_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> Result<Json<Value>, ServerError> {
    state
        .store
        .call(move |db| db.update_profile(id, &update))
        .await?;
    Ok(message("User profile updated successfully"))
}

async fn get_profile(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<Profile>, ServerError> {
    let user = state.store.call(move |db| db.get_user(id)).await?;
    Ok(Json(user.into()))
}

async fn record_activity(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ActivityRequest>,
) -> Result<Json<Value>, ServerError> {
    state
        .store
        .call(move |db| db.record_activity(req.user_id))
        .await?;
    Ok(message("User activity recorded successfully"))
}
