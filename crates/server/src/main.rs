//! GradeBook push delivery server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, middleware};
use gradebook_api::{middleware::AppState, router as api_router};
use gradebook_common::Config;
use gradebook_core::{
    NotificationService, PushChannel, PushNotificationService, UserService, VapidConfig,
    WebPushTransport,
};
use gradebook_db::repositories::{
    NotificationRepository, PushSubscriptionRepository, UserRepository,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Build the push channel from configuration.
///
/// Returns `None` when VAPID credentials are missing or malformed; the
/// server still runs, with every send operation failing fast.
fn build_push_channel(config: &Config) -> Option<PushChannel> {
    let vapid = VapidConfig::from_settings(&config.push)?;
    match WebPushTransport::new(vapid.subject, vapid.private_key) {
        Ok(transport) => Some(PushChannel {
            public_key: vapid.public_key,
            transport: Arc::new(transport),
        }),
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize push transport");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gradebook=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting GradeBook server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = gradebook_db::init(&config).await?;
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    gradebook_db::migrate(&db).await?;
    info!("Migrations completed");

    // Initialize repositories
    let db = Arc::new(db);
    let user_repo = UserRepository::new(Arc::clone(&db));
    let notification_repo = NotificationRepository::new(Arc::clone(&db));
    let push_subscription_repo = PushSubscriptionRepository::new(Arc::clone(&db));

    // Validate VAPID credentials and wire up the push channel
    let push_channel = build_push_channel(&config);
    if push_channel.is_some() {
        info!("Push delivery enabled");
    } else {
        info!("Push delivery disabled");
    }

    // Initialize services
    let user_service = UserService::new(user_repo.clone());
    let push_service = PushNotificationService::new(push_subscription_repo, push_channel);
    let notification_service =
        NotificationService::new(notification_repo, user_repo, push_service.clone());

    let state = AppState {
        user_service,
        notification_service,
        push_service: push_service.clone(),
        instance: config.instance.clone(),
    };

    // Build router
    let app = Router::new()
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gradebook_api::middleware::auth_middleware,
        ))
        .layer(middleware::from_fn(
            gradebook_api::middleware::track_metrics,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Periodically deactivate subscriptions past their expiration hint
    let cleanup_service = push_service;
    let cleanup_interval = Duration::from_secs(config.push.cleanup_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        // The first tick fires immediately; skip it so startup stays quiet.
        interval.tick().await;
        loop {
            interval.tick().await;
            match cleanup_service.cleanup_expired().await {
                Ok(0) => {}
                Ok(count) => info!(count, "Expired subscription cleanup pass complete"),
                Err(e) => tracing::warn!(error = %e, "Expired subscription cleanup failed"),
            }
        }
    });

    // Start server with graceful shutdown
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
