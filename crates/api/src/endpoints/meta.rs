//! Meta endpoints.

use axum::{Json, Router, extract::State, routing::post};
use serde::Serialize;

use crate::middleware::AppState;

/// Server metadata response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaResponse {
    pub version: String,
    pub name: String,
    pub description: Option<String>,
    /// Whether push delivery is configured on this instance.
    pub push_available: bool,
}

/// Get server metadata.
async fn meta(State(state): State<AppState>) -> Json<MetaResponse> {
    Json(MetaResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        name: state.instance.name.clone(),
        description: state.instance.description.clone(),
        push_available: state.push_service.is_enabled(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(meta))
}
