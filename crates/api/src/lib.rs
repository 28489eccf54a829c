//! HTTP API layer for GradeBook push delivery.
//!
//! This crate provides the REST API:
//!
//! - **Endpoints**: push subscription lifecycle, notification surface, meta
//! - **Extractors**: bearer-token authentication
//! - **Middleware**: auth, request metrics
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::router;
pub use middleware::AppState;
