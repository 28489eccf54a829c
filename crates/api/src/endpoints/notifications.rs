//! Notification endpoints.

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};

use gradebook_common::{AppError, AppResult};
use gradebook_core::{BatchSummary, CreateNotificationInput, NotificationResponse};

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Request to list notifications.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    /// Maximum number of notifications to return
    pub limit: Option<u64>,
}

/// Request to mark a notification read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    /// Notification ID
    pub notification_id: String,
}

/// Created notification plus its push delivery summary.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationResponse {
    pub notification: NotificationResponse,
    pub push: BatchSummary,
}

/// Unread notification count.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub count: u64,
}

const DEFAULT_LIST_LIMIT: u64 = 50;
const MAX_LIST_LIMIT: u64 = 100;

/// Create a notification and push it to the recipient's devices.
/// Requires a role that may notify others.
async fn create(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateNotificationInput>,
) -> AppResult<ApiResponse<CreateNotificationResponse>> {
    if !user.role.can_notify() {
        return Err(AppError::Forbidden(
            "teacher or admin role required".to_string(),
        ));
    }

    let (notification, push) = state.notification_service.create(input).await?;
    Ok(ApiResponse::ok(CreateNotificationResponse {
        notification,
        push,
    }))
}

/// List the caller's notifications, newest first.
async fn list(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<ListRequest>,
) -> AppResult<ApiResponse<Vec<NotificationResponse>>> {
    let limit = req.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    let notifications = state.notification_service.list(&user.id, limit).await?;
    Ok(ApiResponse::ok(notifications))
}

/// Mark one of the caller's notifications as read.
async fn mark_read(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<MarkReadRequest>,
) -> AppResult<ApiResponse<NotificationResponse>> {
    let notification = state
        .notification_service
        .mark_read(&user.id, &req.notification_id)
        .await?;
    Ok(ApiResponse::ok(notification))
}

/// Count the caller's unread notifications.
async fn unread_count(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<UnreadCountResponse>> {
    let count = state.notification_service.unread_count(&user.id).await?;
    Ok(ApiResponse::ok(UnreadCountResponse { count }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create))
        .route("/list", post(list))
        .route("/mark-read", post(mark_read))
        .route("/unread-count", post(unread_count))
}
