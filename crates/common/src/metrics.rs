//! Metrics collection for the GradeBook push delivery service.
//!
//! Provides application-level counters for monitoring push delivery
//! health, tracking usage patterns, and debugging issues.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance.
static METRICS: std::sync::OnceLock<Arc<Metrics>> = std::sync::OnceLock::new();

/// Get the global metrics instance.
pub fn get_metrics() -> &'static Arc<Metrics> {
    METRICS.get_or_init(|| Arc::new(Metrics::new()))
}

/// Application metrics collector.
#[derive(Debug)]
pub struct Metrics {
    // === Request Metrics ===
    /// Total HTTP requests received
    pub http_requests_total: AtomicU64,
    /// HTTP requests by status code category (2xx, 4xx, 5xx)
    pub http_requests_2xx: AtomicU64,
    pub http_requests_4xx: AtomicU64,
    pub http_requests_5xx: AtomicU64,

    // === Push Delivery Metrics ===
    /// Push messages delivered successfully
    pub pushes_delivered: AtomicU64,
    /// Push deliveries that failed (non-expiry)
    pub pushes_failed: AtomicU64,
    /// Push deliveries rejected as expired (410/404)
    pub pushes_expired: AtomicU64,

    // === Subscription Metrics ===
    /// Subscriptions registered (new rows)
    pub subscriptions_registered: AtomicU64,
    /// Subscriptions removed by explicit unregister
    pub subscriptions_removed: AtomicU64,
    /// Subscriptions deactivated by cleanup or expiry
    pub subscriptions_deactivated: AtomicU64,

    // === Content Metrics ===
    /// Notifications created
    pub notifications_created: AtomicU64,
}

impl Metrics {
    /// Create a new metrics instance with all counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            http_requests_total: AtomicU64::new(0),
            http_requests_2xx: AtomicU64::new(0),
            http_requests_4xx: AtomicU64::new(0),
            http_requests_5xx: AtomicU64::new(0),

            pushes_delivered: AtomicU64::new(0),
            pushes_failed: AtomicU64::new(0),
            pushes_expired: AtomicU64::new(0),

            subscriptions_registered: AtomicU64::new(0),
            subscriptions_removed: AtomicU64::new(0),
            subscriptions_deactivated: AtomicU64::new(0),

            notifications_created: AtomicU64::new(0),
        }
    }

    /// Record a completed HTTP request.
    pub fn record_http_request(&self, status_code: u16) {
        self.http_requests_total.fetch_add(1, Ordering::Relaxed);

        match status_code {
            200..=299 => self.http_requests_2xx.fetch_add(1, Ordering::Relaxed),
            400..=499 => self.http_requests_4xx.fetch_add(1, Ordering::Relaxed),
            500..=599 => self.http_requests_5xx.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
    }

    /// Record a single push delivery outcome.
    pub fn record_push_outcome(&self, delivered: bool, expired: bool) {
        if delivered {
            self.pushes_delivered.fetch_add(1, Ordering::Relaxed);
        } else if expired {
            self.pushes_expired.fetch_add(1, Ordering::Relaxed);
        } else {
            self.pushes_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a new subscription registration.
    pub fn record_subscription_registered(&self) {
        self.subscriptions_registered
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record subscriptions removed by an explicit unregister.
    pub fn record_subscriptions_removed(&self, count: u64) {
        self.subscriptions_removed
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Record subscriptions deactivated by cleanup or expiry.
    pub fn record_subscriptions_deactivated(&self, count: u64) {
        self.subscriptions_deactivated
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Record a created notification.
    pub fn record_notification_created(&self) {
        self.notifications_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            http_requests_total: self.http_requests_total.load(Ordering::Relaxed),
            http_requests_2xx: self.http_requests_2xx.load(Ordering::Relaxed),
            http_requests_4xx: self.http_requests_4xx.load(Ordering::Relaxed),
            http_requests_5xx: self.http_requests_5xx.load(Ordering::Relaxed),

            pushes_delivered: self.pushes_delivered.load(Ordering::Relaxed),
            pushes_failed: self.pushes_failed.load(Ordering::Relaxed),
            pushes_expired: self.pushes_expired.load(Ordering::Relaxed),

            subscriptions_registered: self.subscriptions_registered.load(Ordering::Relaxed),
            subscriptions_removed: self.subscriptions_removed.load(Ordering::Relaxed),
            subscriptions_deactivated: self.subscriptions_deactivated.load(Ordering::Relaxed),

            notifications_created: self.notifications_created.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of all metrics.
#[derive(Debug, Clone, serde::Serialize)]
#[allow(missing_docs)]
pub struct MetricsSnapshot {
    // HTTP
    pub http_requests_total: u64,
    pub http_requests_2xx: u64,
    pub http_requests_4xx: u64,
    pub http_requests_5xx: u64,

    // Push delivery
    pub pushes_delivered: u64,
    pub pushes_failed: u64,
    pub pushes_expired: u64,

    // Subscriptions
    pub subscriptions_registered: u64,
    pub subscriptions_removed: u64,
    pub subscriptions_deactivated: u64,

    // Content
    pub notifications_created: u64,
}
