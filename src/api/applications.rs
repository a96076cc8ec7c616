use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::{AppState, CurrentUser, blocking};
use crate::error::AppError;
use crate::store::applications::ApplicationFilter;
use crate::workflow::ApplicationView;
use crate::workflow::types::{Application, ApplicationInput, ApplicationStatus};

#[derive(Debug, Default, Deserialize)]
pub struct MineQuery {
    pub status: Option<ApplicationStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommentBody {
    #[serde(default)]
    pub comment: Option<String>,
}

/// GET /api/applications
pub async fn list_mine(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<MineQuery>,
) -> Result<Json<Vec<Application>>, AppError> {
    let workflow = state.workflow.clone();
    blocking(move || workflow.list_mine(&current.user, query.status)).await.map(Json)
}

/// POST /api/applications
pub async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(input): Json<ApplicationInput>,
) -> Result<Response, AppError> {
    let workflow = state.workflow.clone();
    let app = blocking(move || workflow.create_draft(&current.user, &input)).await?;
    Ok((StatusCode::CREATED, Json(app)).into_response())
}

pub async fn detail(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<ApplicationView>, AppError> {
    let workflow = state.workflow.clone();
    blocking(move || workflow.detail(&current.user, id)).await.map(Json)
}

pub async fn update(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<ApplicationInput>,
) -> Result<Json<Application>, AppError> {
    let workflow = state.workflow.clone();
    blocking(move || workflow.update_draft(&current.user, id, &input)).await.map(Json)
}

pub async fn delete(State(state): State<AppState>, current: CurrentUser, Path(id): Path<i64>) -> Result<StatusCode, AppError> {
    let workflow = state.workflow.clone();
    blocking(move || workflow.delete_draft(&current.user, id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Application>, AppError> {
    let workflow = state.workflow.clone();
    blocking(move || workflow.submit(&current.user, id)).await.map(Json)
}

pub async fn withdraw(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    body: Option<Json<CommentBody>>,
) -> Result<Json<Application>, AppError> {
    let comment = body.and_then(|Json(b)| b.comment);
    let workflow = state.workflow.clone();
    blocking(move || workflow.withdraw(&current.user, id, comment.as_deref())).await.map(Json)
}

pub async fn reopen(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Application>, AppError> {
    let workflow = state.workflow.clone();
    blocking(move || workflow.reopen(&current.user, id)).await.map(Json)
}

/// GET /api/admin/applications
pub async fn list_all(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(filter): Query<ApplicationFilter>,
) -> Result<Json<Vec<Application>>, AppError> {
    current.require_admin()?;
    let store = state.store.clone();
    blocking(move || store.list_applications(&filter)).await.map(Json)
}
