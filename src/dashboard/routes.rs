//! Control API route handlers.
//!
//! All endpoints return JSON. State is the shared `SessionController`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::activity::{ActivityEvent, DEFAULT_CAPACITY};
use crate::session::{SessionController, SessionStatus};
use crate::types::{LiquidationReport, Session, TraderError};

pub type AppState = Arc<SessionController>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    /// Number or numeric string, validated by the controller.
    pub amount: serde_json::Value,
    #[serde(default)]
    pub max_trade_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    pub ok: bool,
    pub session: Session,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmergencyResponse {
    pub ok: bool,
    pub flat: bool,
    pub report: LiquidationReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// `TraderError` rendered as an HTTP error.
pub struct ApiError(TraderError);

impl From<TraderError> for ApiError {
    fn from(e: TraderError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TraderError::Validation(_) => StatusCode::BAD_REQUEST,
            TraderError::AlreadyRunning => StatusCode::CONFLICT,
            TraderError::Precondition(_) => StatusCode::PRECONDITION_FAILED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(status = %status, error = %self.0, "Command rejected");
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// POST /api/start
pub async fn start(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let amount = match &req.amount {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    state.start_from_input(&amount, req.max_trade_count).await?;
    Ok(Json(CommandResponse {
        ok: true,
        session: state.session().await,
    }))
}

/// POST /api/stop
pub async fn stop(State(state): State<AppState>) -> Json<CommandResponse> {
    state.stop().await;
    Json(CommandResponse {
        ok: true,
        session: state.session().await,
    })
}

/// POST /api/emergency-stop
pub async fn emergency_stop(State(state): State<AppState>) -> Json<EmergencyResponse> {
    let report = state.emergency_stop().await;
    Json(EmergencyResponse {
        ok: true,
        flat: report.is_flat(),
        report,
    })
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(state.status().await)
}

/// GET /api/logs?limit=N
pub async fn get_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Json<Vec<ActivityEvent>> {
    let limit = query.limit.unwrap_or(DEFAULT_CAPACITY);
    Json(state.activity().recent(limit))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
