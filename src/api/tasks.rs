//! Approver inbox and decisions.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use super::applications::CommentBody;
use super::{AppState, CurrentUser, blocking};
use crate::error::AppError;
use crate::store::applications::TaskView;
use crate::workflow::types::{Application, Decision, Task};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskScope {
    #[default]
    Pending,
    Handled,
}

#[derive(Debug, Default, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    pub scope: TaskScope,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub to_user: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

/// GET /api/tasks?scope=pending|handled
pub async fn inbox(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<InboxQuery>,
) -> Result<Json<Vec<TaskView>>, AppError> {
    let pending = query.scope == TaskScope::Pending;
    let workflow = state.workflow.clone();
    blocking(move || workflow.inbox(&current.user, pending)).await.map(Json)
}

async fn decide(
    state: AppState,
    current: CurrentUser,
    task_id: i64,
    decision: Decision,
    body: Option<Json<CommentBody>>,
) -> Result<Json<Application>, AppError> {
    let comment = body.and_then(|Json(b)| b.comment);
    let workflow = state.workflow.clone();
    blocking(move || workflow.act(&current.user, task_id, decision, comment.as_deref()))
        .await
        .map(Json)
}

pub async fn approve(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    body: Option<Json<CommentBody>>,
) -> Result<Json<Application>, AppError> {
    decide(state, current, id, Decision::Approve, body).await
}

pub async fn reject(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    body: Option<Json<CommentBody>>,
) -> Result<Json<Application>, AppError> {
    decide(state, current, id, Decision::Reject, body).await
}

pub async fn transfer(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<Task>, AppError> {
    let workflow = state.workflow.clone();
    blocking(move || workflow.transfer(&current.user, id, req.to_user, req.comment.as_deref()))
        .await
        .map(Json)
}
