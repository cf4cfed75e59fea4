//! HTTP routes over the `server_api` handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch},
    Json, Router,
};
use shared::{
    domain::{
        AuditEntry, GroupSummary, Honour, HonourField, HonourId, Member, MemberField, MemberId,
        RegistrationFlag,
    },
    error::{ApiError, ErrorCode},
    protocol::{
        AuditQuery, CreateGroupRequest, CreateHonourRequest, CreateMemberRequest, HonourQuery,
        LogActionRequest, MemberQuery, UpdateFieldRequest, UpdateFlagRequest,
    },
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::error;

use crate::app_state::AppState;

pub(crate) const MAX_BODY_BYTES: usize = 64 * 1024;

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub(crate) fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/groups", get(http_list_groups).post(http_create_group))
        .route("/members", get(http_list_members).post(http_create_member))
        .route("/members/:member_id", delete(http_delete_member))
        .route("/members/:member_id/fields", patch(http_update_member_field))
        .route(
            "/members/:member_id/registration",
            patch(http_set_registration_flag),
        )
        .route("/honours", get(http_list_honours).post(http_create_honour))
        .route("/honours/:honour_id", delete(http_delete_honour))
        .route("/honours/:honour_id/fields", patch(http_update_honour_field))
        .route("/audit", get(http_list_actions).post(http_record_action))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    if err.code == ErrorCode::Internal {
        error!(message = %err.message, "request failed");
    }
    (status_for(err.code), Json(err))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    state.api.storage.health_check().await.map_err(|error| {
        error!(%error, "health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok("ok")
}

async fn http_list_groups(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<GroupSummary>>> {
    let groups = server_api::list_groups(&state.api).await.map_err(reject)?;
    Ok(Json(groups))
}

async fn http_create_group(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGroupRequest>,
) -> ApiResult<(StatusCode, Json<GroupSummary>)> {
    let group = server_api::create_group(&state.api, req)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn http_list_members(
    State(state): State<Arc<AppState>>,
    Query(q): Query<MemberQuery>,
) -> ApiResult<Json<Vec<Member>>> {
    let members = server_api::list_members(&state.api, &q)
        .await
        .map_err(reject)?;
    Ok(Json(members))
}

async fn http_create_member(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateMemberRequest>,
) -> ApiResult<(StatusCode, Json<Member>)> {
    let member = server_api::create_member(&state.api, req)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(member)))
}

async fn http_update_member_field(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<String>,
    Json(req): Json<UpdateFieldRequest<MemberField>>,
) -> ApiResult<StatusCode> {
    server_api::update_member_field(&state.api, &MemberId(member_id), req.field, &req.value)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_set_registration_flag(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<String>,
    Json(req): Json<UpdateFlagRequest<RegistrationFlag>>,
) -> ApiResult<StatusCode> {
    server_api::set_registration_flag(&state.api, &MemberId(member_id), req.flag, req.value)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_delete_member(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<String>,
) -> ApiResult<StatusCode> {
    server_api::delete_member(&state.api, &MemberId(member_id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_list_honours(
    State(state): State<Arc<AppState>>,
    Query(q): Query<HonourQuery>,
) -> ApiResult<Json<Vec<Honour>>> {
    let honours = server_api::list_honours(&state.api, &q)
        .await
        .map_err(reject)?;
    Ok(Json(honours))
}

async fn http_create_honour(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateHonourRequest>,
) -> ApiResult<(StatusCode, Json<Honour>)> {
    let honour = server_api::create_honour(&state.api, req)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(honour)))
}

async fn http_update_honour_field(
    State(state): State<Arc<AppState>>,
    Path(honour_id): Path<String>,
    Json(req): Json<UpdateFieldRequest<HonourField>>,
) -> ApiResult<StatusCode> {
    server_api::update_honour_field(&state.api, &HonourId(honour_id), req.field, &req.value)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_delete_honour(
    State(state): State<Arc<AppState>>,
    Path(honour_id): Path<String>,
) -> ApiResult<StatusCode> {
    server_api::delete_honour(&state.api, &HonourId(honour_id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_list_actions(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    let entries = server_api::list_actions(&state.api, q.limit)
        .await
        .map_err(reject)?;
    Ok(Json(entries))
}

async fn http_record_action(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LogActionRequest>,
) -> ApiResult<(StatusCode, Json<AuditEntry>)> {
    let entry = server_api::record_action(&state.api, req)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
