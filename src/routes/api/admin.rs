use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use macros::JsonErrorResponse;
use serde_json::json;

use crate::{
    utils::{error::ErrorResponse, extractors::AuthUser, response::Metadata},
    AppState,
};

/// Manual trigger for one status sweep, outside the periodic timer.
pub async fn sweep(State(state): State<AppState>, AuthUser(_): AuthUser) -> AdminResult {
    let outcome = state.updater.force_sweep().await.map_err(|e| {
        tracing::error!("forced sweep failed: {e}");
        AdminError::SweepFailed
    })?;
    Ok(Json(json!({
        "outcome": outcome,
        "_metadata": Metadata::default(),
    }))
    .into_response())
}

/// Events whose stored status lags behind the clock; what the next sweep
/// would pick up.
pub async fn stale_events(State(state): State<AppState>, AuthUser(_): AuthUser) -> AdminResult {
    let events = state
        .updater
        .find_stale_events(Utc::now())
        .await
        .map_err(|_| AdminError::DatabaseError)?;
    let count = events.len() as i64;
    Ok(Json(json!({
        "events": events,
        "_metadata": Metadata {
            total_count: Some(count),
            ..Default::default()
        },
    }))
    .into_response())
}

#[derive(thiserror::Error, Debug, JsonErrorResponse)]
pub enum AdminError {
    #[error("Sweep failed")]
    #[status_code(StatusCode::INTERNAL_SERVER_ERROR)]
    SweepFailed,

    #[error("Database error")]
    #[status_code(StatusCode::INTERNAL_SERVER_ERROR)]
    DatabaseError,
}

pub type AdminResult = Result<Response, AdminError>;
