use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::{AppState, CurrentUser, blocking};
use crate::error::AppError;
use crate::workflow::RoutePreview;
use crate::workflow::types::{ApplicationDetail, ApplicationType, Rule, RuleInput};

#[derive(Debug, Default, Deserialize)]
pub struct RuleQuery {
    pub app_type: Option<ApplicationType>,
}

#[derive(Debug, Deserialize)]
pub struct EnabledFlag {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    /// Defaults to the caller. Only admins may preview for someone else.
    #[serde(default)]
    pub applicant_id: Option<i64>,
    pub detail: ApplicationDetail,
}

pub async fn list(
    State(state): State<AppState>,
    _: CurrentUser,
    Query(query): Query<RuleQuery>,
) -> Result<Json<Vec<Rule>>, AppError> {
    let store = state.store.clone();
    blocking(move || store.list_rules(query.app_type)).await.map(Json)
}

pub async fn get(State(state): State<AppState>, _: CurrentUser, Path(id): Path<i64>) -> Result<Json<Rule>, AppError> {
    let store = state.store.clone();
    blocking(move || store.get_rule(id)).await.map(Json)
}

pub async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(input): Json<RuleInput>,
) -> Result<Response, AppError> {
    current.require_admin()?;
    let store = state.store.clone();
    let rule = blocking(move || store.create_rule(&input)).await?;
    Ok((StatusCode::CREATED, Json(rule)).into_response())
}

pub async fn update(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<RuleInput>,
) -> Result<Json<Rule>, AppError> {
    current.require_admin()?;
    let store = state.store.clone();
    blocking(move || store.update_rule(id, &input)).await.map(Json)
}

pub async fn set_enabled(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(flag): Json<EnabledFlag>,
) -> Result<Json<Rule>, AppError> {
    current.require_admin()?;
    let store = state.store.clone();
    blocking(move || store.set_rule_enabled(id, flag.enabled)).await.map(Json)
}

pub async fn delete(State(state): State<AppState>, current: CurrentUser, Path(id): Path<i64>) -> Result<StatusCode, AppError> {
    current.require_admin()?;
    let store = state.store.clone();
    blocking(move || store.delete_rule(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/rules/preview
pub async fn preview(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<PreviewRequest>,
) -> Result<Json<RoutePreview>, AppError> {
    let applicant_id = match req.applicant_id {
        Some(id) if id != current.user.id => {
            current.require_admin()?;
            id
        }
        _ => current.user.id,
    };
    let workflow = state.workflow.clone();
    blocking(move || workflow.preview(applicant_id, &req.detail)).await.map(Json)
}
