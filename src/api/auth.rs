//! Session endpoints and the bearer-token extractor.

use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::{AppState, blocking};
use crate::error::AppError;
use crate::store::users::User;

/// The authenticated caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

impl CurrentUser {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.user.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("administrator role required".into()))
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;
        let auth = state.auth.clone();
        let lookup = token.clone();
        let user = blocking(move || auth.authenticate(&lookup)).await?;
        Ok(Self { user, token })
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: i64,
    pub user: User,
}

/// POST /api/auth/login
pub async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Result<Json<LoginResponse>, AppError> {
    let auth = state.auth.clone();
    let (session, user) = blocking(move || auth.login(&req.username, &req.password)).await?;
    Ok(Json(LoginResponse { token: session.token, expires_at: session.expires_at, user }))
}

/// POST /api/auth/logout
pub async fn logout(State(state): State<AppState>, current: CurrentUser) -> Result<Response, AppError> {
    let auth = state.auth.clone();
    blocking(move || auth.logout(&current.token)).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// GET /api/auth/me
pub async fn me(current: CurrentUser) -> Json<User> {
    Json(current.user)
}

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
}

/// POST /api/auth/password
pub async fn change_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<PasswordChange>,
) -> Result<Response, AppError> {
    let auth = state.auth.clone();
    blocking(move || auth.change_password(&current.user, &req.old_password, &req.new_password)).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
