use axum::{Json, extract::State};

use super::{AppState, CurrentUser, blocking};
use crate::error::AppError;
use crate::stats::{Dashboard, Overview};

/// GET /api/stats/dashboard
pub async fn dashboard(State(state): State<AppState>, current: CurrentUser) -> Result<Json<Dashboard>, AppError> {
    let store = state.store.clone();
    blocking(move || store.dashboard(current.user.id)).await.map(Json)
}

/// GET /api/stats/overview
pub async fn overview(State(state): State<AppState>, current: CurrentUser) -> Result<Json<Overview>, AppError> {
    current.require_admin()?;
    let store = state.store.clone();
    blocking(move || store.overview()).await.map(Json)
}
