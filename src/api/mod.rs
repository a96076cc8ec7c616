//! JSON REST API over axum.
//!
//! ## URL layout
//!
//! ```text
//! GET  /api/health
//! POST /api/auth/login | /api/auth/logout | /api/auth/password
//! GET  /api/auth/me
//! CRUD /api/departments, /api/posts, /api/users, /api/rules      (admin writes)
//! POST /api/rules/preview
//! CRUD /api/applications          POST /api/applications/{id}/submit|withdraw|reopen
//! GET  /api/admin/applications
//! GET  /api/tasks                 POST /api/tasks/{id}/approve|reject|transfer
//! GET  /api/stats/dashboard | /api/stats/overview
//! ```
//!
//! All store access is blocking SQLite, so handlers hop onto the blocking
//! pool through [`blocking`].

mod applications;
mod auth;
mod org;
mod rules;
mod stats;
mod tasks;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::Auth;
use crate::error::AppError;
use crate::store::Store;
use crate::workflow::Workflow;

pub use auth::CurrentUser;

/// Router state injected into every handler.
///
/// Cheap to clone: the services only hold a database path and config.
#[derive(Clone)]
pub struct AppState {
    pub name: Arc<str>,
    pub store: Store,
    pub auth: Auth,
    pub workflow: Workflow,
}

impl AppState {
    pub fn new(name: &str, store: Store, auth: Auth) -> Self {
        Self {
            name: Arc::from(name),
            workflow: Workflow::new(store.clone()),
            store,
            auth,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NoApplicableRule(_) | AppError::NoApprover(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Config(_) | AppError::Logger(_) | AppError::Store(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            warn!("request failed: {self}");
        }
        let body = json!({ "error": self.code(), "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Run blocking store work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Store(format!("blocking task failed: {e}")))?
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Response {
    let store = state.store.clone();
    match blocking(move || store.conn().map(|_| ())).await {
        Ok(()) => Json(json!({ "status": "ok", "name": &*state.name })).into_response(),
        Err(e) => {
            warn!("health check failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "name": &*state.name })),
            )
                .into_response()
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health",                       get(health))
        // Auth
        .route("/api/auth/login",                   post(auth::login))
        .route("/api/auth/logout",                  post(auth::logout))
        .route("/api/auth/me",                      get(auth::me))
        .route("/api/auth/password",                post(auth::change_password))
        // Organisation
        .route("/api/departments",                  get(org::list_departments).post(org::create_department))
        .route("/api/departments/{id}",             get(org::get_department).put(org::update_department).delete(org::delete_department))
        .route("/api/posts",                        get(org::list_posts).post(org::create_post))
        .route("/api/posts/{id}",                   get(org::get_post).put(org::update_post).delete(org::delete_post))
        .route("/api/users",                        get(org::list_users).post(org::create_user))
        .route("/api/users/{id}",                   get(org::get_user).put(org::update_user))
        .route("/api/users/{id}/password",          post(org::reset_password))
        .route("/api/users/{id}/active",            post(org::set_active))
        // Rules
        .route("/api/rules",                        get(rules::list).post(rules::create))
        .route("/api/rules/preview",                post(rules::preview))
        .route("/api/rules/{id}",                   get(rules::get).put(rules::update).delete(rules::delete))
        .route("/api/rules/{id}/enabled",           post(rules::set_enabled))
        // Applications
        .route("/api/applications",                 get(applications::list_mine).post(applications::create))
        .route("/api/applications/{id}",            get(applications::detail).put(applications::update).delete(applications::delete))
        .route("/api/applications/{id}/submit",     post(applications::submit))
        .route("/api/applications/{id}/withdraw",   post(applications::withdraw))
        .route("/api/applications/{id}/reopen",     post(applications::reopen))
        .route("/api/admin/applications",           get(applications::list_all))
        // Tasks
        .route("/api/tasks",                        get(tasks::inbox))
        .route("/api/tasks/{id}/approve",           post(tasks::approve))
        .route("/api/tasks/{id}/reject",            post(tasks::reject))
        .route("/api/tasks/{id}/transfer",          post(tasks::transfer))
        // Stats
        .route("/api/stats/dashboard",              get(stats::dashboard))
        .route("/api/stats/overview",               get(stats::overview))
        .with_state(state)
}

/// Serve the API on `bind_addr` until `shutdown` is cancelled.
pub async fn serve(bind_addr: &str, state: AppState, shutdown: CancellationToken) -> Result<(), AppError> {
    let router = build_router(state);

    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| AppError::Config(format!("bind failed on {bind_addr}: {e}")))?;

    info!(%bind_addr, "api listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("api shut down");
    Ok(())
}
