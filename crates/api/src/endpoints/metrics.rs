//! Process metrics endpoint.

use axum::{Json, Router, routing::get};
use gradebook_common::{MetricsSnapshot, get_metrics};

use crate::middleware::AppState;

/// Get a snapshot of process counters.
async fn snapshot() -> Json<MetricsSnapshot> {
    Json(get_metrics().snapshot())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(snapshot))
}
