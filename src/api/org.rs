//! Departments, posts and users. Reads are open to any signed-in user;
//! writes require the admin role.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::{AppState, CurrentUser, blocking};
use crate::error::AppError;
use crate::store::org::{Department, DepartmentInput, Post, PostInput};
use crate::store::users::{NewUser, User, UserFilter, UserUpdate};

// ── Departments ─────────────────────────────────────────────────────────────

pub async fn list_departments(State(state): State<AppState>, _: CurrentUser) -> Result<Json<Vec<Department>>, AppError> {
    let store = state.store.clone();
    blocking(move || store.list_departments()).await.map(Json)
}

pub async fn get_department(
    State(state): State<AppState>,
    _: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Department>, AppError> {
    let store = state.store.clone();
    blocking(move || store.get_department(id)).await.map(Json)
}

pub async fn create_department(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(input): Json<DepartmentInput>,
) -> Result<Response, AppError> {
    current.require_admin()?;
    let store = state.store.clone();
    let dept = blocking(move || store.create_department(&input)).await?;
    Ok((StatusCode::CREATED, Json(dept)).into_response())
}

pub async fn update_department(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<DepartmentInput>,
) -> Result<Json<Department>, AppError> {
    current.require_admin()?;
    let store = state.store.clone();
    blocking(move || store.update_department(id, &input)).await.map(Json)
}

pub async fn delete_department(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    current.require_admin()?;
    let store = state.store.clone();
    blocking(move || store.delete_department(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Posts ───────────────────────────────────────────────────────────────────

pub async fn list_posts(State(state): State<AppState>, _: CurrentUser) -> Result<Json<Vec<Post>>, AppError> {
    let store = state.store.clone();
    blocking(move || store.list_posts()).await.map(Json)
}

pub async fn get_post(State(state): State<AppState>, _: CurrentUser, Path(id): Path<i64>) -> Result<Json<Post>, AppError> {
    let store = state.store.clone();
    blocking(move || store.get_post(id)).await.map(Json)
}

pub async fn create_post(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(input): Json<PostInput>,
) -> Result<Response, AppError> {
    current.require_admin()?;
    let store = state.store.clone();
    let post = blocking(move || store.create_post(&input)).await?;
    Ok((StatusCode::CREATED, Json(post)).into_response())
}

pub async fn update_post(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<PostInput>,
) -> Result<Json<Post>, AppError> {
    current.require_admin()?;
    let store = state.store.clone();
    blocking(move || store.update_post(id, &input)).await.map(Json)
}

pub async fn delete_post(State(state): State<AppState>, current: CurrentUser, Path(id): Path<i64>) -> Result<StatusCode, AppError> {
    current.require_admin()?;
    let store = state.store.clone();
    blocking(move || store.delete_post(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Users ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    #[serde(flatten)]
    pub user: NewUser,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordReset {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ActiveFlag {
    pub active: bool,
}

pub async fn list_users(
    State(state): State<AppState>,
    _: CurrentUser,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Vec<User>>, AppError> {
    let store = state.store.clone();
    blocking(move || store.list_users(&filter)).await.map(Json)
}

pub async fn get_user(State(state): State<AppState>, _: CurrentUser, Path(id): Path<i64>) -> Result<Json<User>, AppError> {
    let store = state.store.clone();
    blocking(move || store.get_user(id)).await.map(Json)
}

pub async fn create_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<CreateUser>,
) -> Result<Response, AppError> {
    current.require_admin()?;
    let auth = state.auth.clone();
    let user = blocking(move || auth.create_user(&req.user, &req.password)).await?;
    Ok((StatusCode::CREATED, Json(user)).into_response())
}

pub async fn update_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<User>, AppError> {
    current.require_admin()?;
    let store = state.store.clone();
    blocking(move || store.update_user(id, &update)).await.map(Json)
}

pub async fn reset_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<PasswordReset>,
) -> Result<StatusCode, AppError> {
    current.require_admin()?;
    let auth = state.auth.clone();
    blocking(move || auth.reset_password(id, &req.password)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_active(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(flag): Json<ActiveFlag>,
) -> Result<Json<User>, AppError> {
    current.require_admin()?;
    if id == current.user.id && !flag.active {
        return Err(AppError::Validation("administrators cannot deactivate themselves".into()));
    }
    let store = state.store.clone();
    blocking(move || store.set_active(id, flag.active)).await.map(Json)
}
