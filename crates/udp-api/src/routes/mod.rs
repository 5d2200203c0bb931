mod status;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status::get_status))
        .route("/streams", get(status::get_streams))
        .route("/report", get(status::get_report))
        .route("/check", post(status::run_check))
}
