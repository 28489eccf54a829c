//! API middleware.

#![allow(missing_docs)]

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use gradebook_common::{config::InstanceConfig, get_metrics};
use gradebook_core::{NotificationService, PushNotificationService, UserService};

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub user_service: UserService,
    pub notification_service: NotificationService,
    pub push_service: PushNotificationService,
    pub instance: InstanceConfig,
}

/// Authentication middleware.
///
/// Resolves a `Bearer` token to a user and stores the model in request
/// extensions for the `AuthUser` extractor. Requests without a valid
/// token pass through unauthenticated; protected handlers reject them.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(auth_header) = req.headers().get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
        && let Ok(user) = state.user_service.authenticate_by_token(token).await
    {
        req.extensions_mut().insert(user);
    }

    next.run(req).await
}

/// Request metrics middleware. Counts responses by status class.
pub async fn track_metrics(req: Request<Body>, next: Next) -> Response {
    let response = next.run(req).await;
    get_metrics().record_http_request(response.status().as_u16());
    response
}
