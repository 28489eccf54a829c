//! API endpoints.

mod meta;
mod metrics;
mod notifications;
mod push;

use axum::Router;

use crate::middleware::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/meta", meta::router())
        .nest("/push", push::router())
        .nest("/notifications", notifications::router())
        .nest("/metrics", metrics::router())
}
