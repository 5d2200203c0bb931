use axum::extract::State;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use udp_core::{CheckReport, StreamConfig};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct CheckSettings {
    pub timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub require_data: bool,
    pub interval_ms: u64,
    pub max_concurrent: usize,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub id: Uuid,
    pub monitor_id: String,
    pub state: String,
    pub created_at: String,
    pub last_checked: Option<String>,
    pub cycle_count: u64,
    pub stream_count: usize,
    pub settings: CheckSettings,
}

#[derive(Serialize)]
pub struct StreamsResponse {
    pub streams: Vec<StreamConfig>,
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let m = &state.monitor;
    let c = m.config();

    Json(StatusResponse {
        id: m.id(),
        monitor_id: m.monitor_id().to_string(),
        state: m.state().await.to_string(),
        created_at: m.created_at().to_rfc3339(),
        last_checked: m.last_checked().await.map(|t| t.to_rfc3339()),
        cycle_count: m.cycle_count().await,
        stream_count: m.streams().len(),
        settings: CheckSettings {
            timeout_ms: c.timeout.as_millis() as u64,
            retry_attempts: c.retry_attempts,
            retry_delay_ms: c.retry_delay.as_millis() as u64,
            require_data: c.require_data,
            interval_ms: c.check_interval.as_millis() as u64,
            max_concurrent: c.max_concurrent_checks,
        },
    })
}

/// GET /api/v1/streams
pub async fn get_streams(State(state): State<AppState>) -> Json<StreamsResponse> {
    Json(StreamsResponse {
        streams: state.monitor.streams().to_vec(),
    })
}

/// GET /api/v1/report
pub async fn get_report(State(state): State<AppState>) -> Result<Json<CheckReport>, ApiError> {
    state
        .monitor
        .latest_report()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No check cycle has completed yet".into()))
}

/// POST /api/v1/check
pub async fn run_check(State(state): State<AppState>) -> Json<CheckReport> {
    Json(state.monitor.run_once().await)
}
