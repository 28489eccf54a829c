//! Push subscription endpoints.

use axum::{Json, Router, extract::State, http::HeaderMap, routing::post};
use serde::{Deserialize, Serialize};

use gradebook_common::{AppError, AppResult};
use gradebook_core::{
    BatchSummary, PushConfigResponse, RegisterSubscriptionInput, SubscriptionResponse,
};
use gradebook_db::repositories::SchoolSubscriptionCount;

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Request to unregister one subscription.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterRequest {
    /// Push service endpoint URL identifying the device
    pub endpoint: String,
}

/// Request to send a test push.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPushRequest {
    /// Optional title override
    pub title: Option<String>,
    /// Optional body override
    pub body: Option<String>,
}

/// Count of removed subscriptions.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedResponse {
    pub removed: u64,
}

/// Count of deactivated subscriptions.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivatedResponse {
    pub deactivated: u64,
}

/// Get push configuration (availability, public key).
async fn get_config(State(state): State<AppState>) -> AppResult<ApiResponse<PushConfigResponse>> {
    let response = PushConfigResponse {
        available: state.push_service.is_enabled(),
        public_key: state.push_service.public_key().ok().map(String::from),
    };
    Ok(ApiResponse::ok(response))
}

/// Register a browser push subscription for the caller.
async fn register(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<RegisterSubscriptionInput>,
) -> AppResult<ApiResponse<SubscriptionResponse>> {
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let subscription = state
        .push_service
        .register(&user.id, user.school_id.as_deref(), input, user_agent)
        .await?;

    Ok(ApiResponse::ok(subscription))
}

/// Unregister one of the caller's subscriptions by endpoint.
async fn unregister(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<UnregisterRequest>,
) -> AppResult<ApiResponse<()>> {
    state.push_service.unregister(&user.id, &req.endpoint).await?;
    Ok(ApiResponse::ok(()))
}

/// Unregister every device of the caller.
async fn unregister_all(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<RemovedResponse>> {
    let removed = state.push_service.unregister_all(&user.id).await?;
    Ok(ApiResponse::ok(RemovedResponse { removed }))
}

/// List the caller's active subscriptions.
async fn list(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<SubscriptionResponse>>> {
    let subscriptions = state.push_service.list_active(&user.id).await?;
    Ok(ApiResponse::ok(subscriptions))
}

/// Send a short-lived test push to all of the caller's devices.
async fn send_test(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<TestPushRequest>,
) -> AppResult<ApiResponse<BatchSummary>> {
    let summary = state
        .push_service
        .send_test(&user.id, req.title, req.body)
        .await?;
    Ok(ApiResponse::ok(summary))
}

/// Deactivate subscriptions past their expiration hint. Admin only.
async fn cleanup(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<DeactivatedResponse>> {
    if !user.role.is_admin() {
        return Err(AppError::Forbidden("admin role required".to_string()));
    }
    let deactivated = state.push_service.cleanup_expired().await?;
    Ok(ApiResponse::ok(DeactivatedResponse { deactivated }))
}

/// Active subscription counts per school. Admin only.
async fn stats(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<SchoolSubscriptionCount>>> {
    if !user.role.is_admin() {
        return Err(AppError::Forbidden("admin role required".to_string()));
    }
    let counts = state.push_service.school_stats().await?;
    Ok(ApiResponse::ok(counts))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/config", post(get_config))
        .route("/register", post(register))
        .route("/unregister", post(unregister))
        .route("/unregister-all", post(unregister_all))
        .route("/list", post(list))
        .route("/test", post(send_test))
        .route("/cleanup", post(cleanup))
        .route("/stats", post(stats))
}
