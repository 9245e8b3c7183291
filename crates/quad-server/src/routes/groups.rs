use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use quad_shared::constants::DEFAULT_PAGE_SIZE;
use quad_shared::{GroupId, UserId};
use quad_store::{Group, MemberPage, Membership, NewGroup};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::error::{ApiJson, ApiPath, ApiQuery, ServerError};
use crate::routes::message;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_group))
        .route(
            "/members",
            get(list_members).post(add_member).delete(remove_member),
        )
        .route("/members/role", put(update_role))
        .route("/membership", get(get_membership))
        .route("/{group_id}", get(get_group))
}

#[derive(Deserialize)]
struct AddMemberRequest {
    group_id: GroupId,
    user_id: UserId,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Deserialize)]
struct RemoveMemberRequest {
    group_id: GroupId,
    user_id_to_remove: UserId,
    requested_by: UserId,
}

#[derive(Deserialize)]
struct UpdateRoleRequest {
    group_id: GroupId,
    target_user_id: UserId,
    new_role: String,
    requested_by: UserId,
}

#[derive(Deserialize)]
struct MembersQuery {
    group_id: GroupId,
    #[serde(default = "first_page")]
    page: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn first_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Deserialize)]
struct MembershipQuery {
    group_id: GroupId,
    user_id: UserId,
}

async fn create_group(
    State(state): State<AppState>,
    ApiJson(new): ApiJson<NewGroup>,
) -> Result<(StatusCode, Json<Value>), ServerError> {
    let group = state.store.call(move |db| db.create_group(&new)).await?;
    Ok((StatusCode::CREATED, Json(json!({ "group_id": group.id }))))
}

async fn get_group(
    State(state): State<AppState>,
    ApiPath(group_id): ApiPath<GroupId>,
) -> Result<Json<Group>, ServerError> {
    let group = state.store.call(move |db| db.get_group(group_id)).await?;
    Ok(Json(group))
}

async fn add_member(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AddMemberRequest>,
) -> Result<(StatusCode, Json<Value>), ServerError> {
    let membership = state
        .store
        .call(move |db| db.add_member(req.group_id, req.user_id, req.role.as_deref()))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User added to group successfully",
            "membership": membership,
        })),
    ))
}

async fn remove_member(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RemoveMemberRequest>,
) -> Result<Json<Value>, ServerError> {
    state
        .store
        .call(move |db| db.remove_member(req.group_id, req.user_id_to_remove, req.requested_by))
        .await?;
    Ok(message("User removed from group successfully"))
}

async fn update_role(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<UpdateRoleRequest>,
) -> Result<Json<Value>, ServerError> {
    let membership = state
        .store
        .call(move |db| {
            db.update_role(req.group_id, req.target_user_id, &req.new_role, req.requested_by)
        })
        .await?;
    Ok(Json(json!({
        "message": "Role updated successfully",
        "membership": membership,
    })))
}

async fn list_members(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<MembersQuery>,
) -> Result<Json<MemberPage>, ServerError> {
    let page = state
        .store
        .call(move |db| db.list_members(query.group_id, query.page, query.limit))
        .await?;
    Ok(Json(page))
}

async fn get_membership(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<MembershipQuery>,
) -> Result<Json<Membership>, ServerError> {
    let membership = state
        .store
        .call(move |db| db.get_membership(query.group_id, query.user_id))
        .await?;
    Ok(Json(membership))
}
