//! Push notification service for Web Push.
//!
//! Owns VAPID credential validation, subscription lifecycle, per-platform
//! payload shaping, single-subscription send classification, and batch
//! fan-out with expiry cleanup.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use gradebook_common::config::PushSettings;
use gradebook_common::{AppError, AppResult, IdGenerator, get_metrics};
use gradebook_db::entities::notification::NotificationCategory;
use gradebook_db::entities::push_subscription::{
    self, LastError, NotificationPreferences, PlatformInfo,
};
use gradebook_db::repositories::{PushSubscriptionRepository, SchoolSubscriptionCount};

use crate::services::push_transport::{
    DeliveryOptions, DeliveryReceipt, PushTarget, PushTransport, TransportError, Urgency,
};

/// TTL for real notification deliveries.
const DEFAULT_TTL_SECS: u32 = 86_400;
/// TTL for test deliveries: stale test pushes are worthless.
const TEST_TTL_SECS: u32 = 300;

/// Expected length of a base64 URL-safe VAPID public key.
const PUBLIC_KEY_LEN: usize = 87;
/// Uncompressed P-256 points start with 0x04, which encodes to 'B'.
const PUBLIC_KEY_PREFIX: char = 'B';
/// Expected length of a base64 URL-safe VAPID private key.
const PRIVATE_KEY_LEN: usize = 43;

/// Validated VAPID credentials.
#[derive(Debug, Clone)]
pub struct VapidConfig {
    /// Subject claim (`mailto:` contact address)
    pub subject: String,
    /// Public key (base64 URL-safe encoded)
    pub public_key: String,
    /// Private key (base64 URL-safe encoded)
    pub private_key: String,
}

impl VapidConfig {
    /// Validate raw push settings into usable credentials.
    ///
    /// Returns `None` when any credential is missing or malformed; push
    /// features are then disabled for the whole process lifetime.
    /// Diagnostic detail goes to the operator log stream only.
    #[must_use]
    pub fn from_settings(settings: &PushSettings) -> Option<Self> {
        let (Some(email), Some(public_key), Some(private_key)) = (
            settings.subject_email.as_deref(),
            settings.public_key.as_deref(),
            settings.private_key.as_deref(),
        ) else {
            tracing::warn!(
                has_email = settings.subject_email.is_some(),
                has_public_key = settings.public_key.is_some(),
                has_private_key = settings.private_key.is_some(),
                "Push credentials incomplete, push delivery disabled"
            );
            return None;
        };

        let public_key_ok = public_key.len() == PUBLIC_KEY_LEN
            && public_key.starts_with(PUBLIC_KEY_PREFIX);
        let private_key_ok = private_key.len() == PRIVATE_KEY_LEN;
        let email_ok = email.contains('@') && email.contains('.');

        tracing::info!(
            public_key_len = public_key.len(),
            public_key_prefix = %public_key.chars().next().unwrap_or(' '),
            public_key_ok,
            private_key_len = private_key.len(),
            private_key_ok,
            email_ok,
            "Validated VAPID credentials"
        );

        if !(public_key_ok && private_key_ok && email_ok) {
            tracing::warn!("Invalid VAPID credentials, push delivery disabled");
            return None;
        }

        let subject = if email.starts_with("mailto:") {
            email.to_string()
        } else {
            format!("mailto:{email}")
        };

        Some(Self {
            subject,
            public_key: public_key.to_string(),
            private_key: private_key.to_string(),
        })
    }
}

/// The configured push channel: public key plus wire transport.
///
/// Constructed once at process start and injected into the service, so
/// the "not configured" path needs no global state.
#[derive(Clone)]
pub struct PushChannel {
    /// VAPID public key handed to browsers at subscribe time.
    pub public_key: String,
    /// Wire transport used for every delivery.
    pub transport: Arc<dyn PushTransport>,
}

/// Client platform a payload is shaped for, resolved once per subscription.
///
/// Precedence when several flags are set: iOS > Android > Desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Ios,
    Android,
    Desktop,
}

impl Platform {
    /// Resolve the tagged platform from stored browser flags.
    #[must_use]
    pub const fn resolve(info: &PlatformInfo) -> Self {
        if info.is_ios {
            Self::Ios
        } else if info.is_android {
            Self::Android
        } else {
            Self::Desktop
        }
    }

    const fn tag_prefix(self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
            Self::Desktop => "desktop",
        }
    }
}

/// Generic notification input handed to the payload shaper.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessageInput {
    /// Notification title
    pub title: Option<String>,
    /// Notification body
    pub body: Option<String>,
    /// Click-through URL
    pub url: Option<String>,
    /// Related notification row ID
    pub notification_id: Option<String>,
    /// Category for preference targeting and client-side routing
    pub category: Option<NotificationCategory>,
    /// Whether the message should wake the device
    #[serde(default)]
    pub urgent: bool,
}

/// The JSON payload handed to the service worker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebPushPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<NotificationCategory>,
    /// Capture time of the batch, not send time.
    pub timestamp: i64,
    pub tag: String,
    pub urgent: bool,
    /// Vibration pattern; iOS does not support vibration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vibrate: Option<Vec<u32>>,
}

/// Build a platform-appropriate payload from generic input.
#[must_use]
pub fn shape_payload(
    platform: Platform,
    input: &PushMessageInput,
    timestamp: DateTime<Utc>,
) -> WebPushPayload {
    let tag_suffix = input
        .notification_id
        .clone()
        .unwrap_or_else(|| timestamp.timestamp_millis().to_string());

    let vibrate = match platform {
        Platform::Ios => None,
        Platform::Android | Platform::Desktop => {
            if input.urgent {
                Some(vec![100, 50, 100, 50, 100])
            } else {
                Some(vec![200, 100, 200])
            }
        }
    };

    WebPushPayload {
        title: input.title.clone().unwrap_or_else(|| "GradeBook".to_string()),
        body: input
            .body
            .clone()
            .unwrap_or_else(|| "New notification".to_string()),
        icon: "/icons/icon-192.png".to_string(),
        badge: "/icons/badge-72.png".to_string(),
        url: input
            .url
            .clone()
            .unwrap_or_else(|| "/app/notifications".to_string()),
        notification_id: input.notification_id.clone(),
        category: input.category,
        timestamp: timestamp.timestamp_millis(),
        tag: format!("{}-{}", platform.tag_prefix(), tag_suffix),
        urgent: input.urgent,
        vibrate,
    }
}

/// Classified outcome of one delivery attempt.
///
/// This is always a value, never an error: a single dead subscription
/// must not abort a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Push service accepted the message.
    Delivered {
        status: u16,
    },
    /// Push service permanently invalidated the subscription (410/404).
    Expired {
        status: u16,
    },
    /// Any other failure, transient or local.
    Failed {
        status: Option<u16>,
        message: String,
    },
}

impl SendOutcome {
    /// Classify a transport result.
    #[must_use]
    pub fn classify(result: Result<DeliveryReceipt, TransportError>) -> Self {
        match result {
            Ok(receipt) => Self::Delivered {
                status: receipt.status_code,
            },
            Err(error) => match error.status_code {
                Some(status @ (410 | 404)) => Self::Expired { status },
                status => Self::Failed {
                    status,
                    message: error.message,
                },
            },
        }
    }

    const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    const fn is_expired(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }

    fn last_error(&self, at: DateTime<Utc>) -> Option<LastError> {
        match self {
            Self::Delivered { .. } => None,
            Self::Expired { status } => Some(LastError {
                message: "subscription expired".to_string(),
                status_code: Some(*status),
                at: at.into(),
            }),
            Self::Failed { status, message } => Some(LastError {
                message: message.clone(),
                status_code: *status,
                at: at.into(),
            }),
        }
    }
}

/// Aggregate result of a batch fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Subset of `failed` rejected as permanently gone.
    pub expired: usize,
}

/// Browser push API keys supplied at registration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionKeys {
    /// P256DH encryption key
    pub p256dh: String,
    /// Auth secret
    pub auth: String,
}

/// Input for registering a push subscription.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSubscriptionInput {
    /// Push service URL for this browser registration
    pub endpoint: String,
    /// Encryption keys; both are required together
    pub keys: Option<SubscriptionKeys>,
    /// Browser-supplied expiration hint
    pub expiration_time: Option<DateTime<Utc>>,
    /// Client platform flags
    pub platform: Option<PlatformInfo>,
}

/// Subscription metadata returned to clients.
///
/// Deliberately omits the encryption keys: they are transport secrets and
/// are never re-exposed once stored.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub id: String,
    pub endpoint: String,
    pub platform: PlatformInfo,
    pub preferences: NotificationPreferences,
    pub is_active: bool,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
}

impl From<push_subscription::Model> for SubscriptionResponse {
    fn from(model: push_subscription::Model) -> Self {
        let platform = model.platform_info();
        let preferences = model.notification_preferences();
        Self {
            id: model.id,
            endpoint: model.endpoint,
            platform,
            preferences,
            is_active: model.is_active,
            created_at: model.created_at.to_rfc3339(),
            last_used_at: model.last_used_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

/// Response for push configuration queries.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushConfigResponse {
    /// Whether push delivery is available
    pub available: bool,
    /// VAPID public key for browser subscribe calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// Push notification service.
#[derive(Clone)]
pub struct PushNotificationService {
    repo: PushSubscriptionRepository,
    channel: Option<PushChannel>,
    id_gen: IdGenerator,
}

impl PushNotificationService {
    /// Create a new push notification service.
    ///
    /// `channel` is `None` when VAPID credentials failed validation; every
    /// send operation then fails fast without touching the transport.
    #[must_use]
    pub fn new(repo: PushSubscriptionRepository, channel: Option<PushChannel>) -> Self {
        Self {
            repo,
            channel,
            id_gen: IdGenerator::new(),
        }
    }

    /// Whether push delivery is configured.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.channel.is_some()
    }

    /// Get the VAPID public key, or a configuration failure.
    pub fn public_key(&self) -> AppResult<&str> {
        self.channel
            .as_ref()
            .map(|c| c.public_key.as_str())
            .ok_or(AppError::PushNotConfigured)
    }

    /// Register a browser subscription, or refresh it when the endpoint is
    /// already known for this user.
    pub async fn register(
        &self,
        user_id: &str,
        school_id: Option<&str>,
        input: RegisterSubscriptionInput,
        user_agent: Option<String>,
    ) -> AppResult<SubscriptionResponse> {
        if input.endpoint.trim().is_empty() {
            return Err(AppError::Validation("endpoint is required".to_string()));
        }
        let keys = input.keys.ok_or_else(|| {
            AppError::Validation("keys.p256dh and keys.auth are required".to_string())
        })?;
        if keys.p256dh.trim().is_empty() || keys.auth.trim().is_empty() {
            return Err(AppError::Validation(
                "keys.p256dh and keys.auth are required together".to_string(),
            ));
        }

        let now = Utc::now();
        let platform = input.platform.unwrap_or_default();

        // Find-or-create keeps the one-endpoint-one-row invariant. A lost
        // race on first-time registration is translated to Conflict by the
        // repository.
        if let Some(existing) = self
            .repo
            .find_by_user_and_endpoint(user_id, &input.endpoint)
            .await?
        {
            let mut active: push_subscription::ActiveModel = existing.into();
            active.p256dh = Set(keys.p256dh);
            active.auth = Set(keys.auth);
            active.expiration_time = Set(input.expiration_time.map(Into::into));
            active.user_agent = Set(user_agent);
            active.platform = Set(serde_json::to_value(&platform)
                .map_err(|e| AppError::Internal(e.to_string()))?);
            active.is_active = Set(true);
            active.updated_at = Set(Some(now.into()));
            active.last_used_at = Set(Some(now.into()));

            let updated = self.repo.update(active).await?;
            tracing::debug!(user_id, endpoint = %updated.endpoint, "Refreshed push subscription");
            return Ok(updated.into());
        }

        let subscription = push_subscription::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(user_id.to_string()),
            school_id: Set(school_id.map(ToString::to_string)),
            endpoint: Set(input.endpoint),
            p256dh: Set(keys.p256dh),
            auth: Set(keys.auth),
            expiration_time: Set(input.expiration_time.map(Into::into)),
            user_agent: Set(user_agent),
            platform: Set(serde_json::to_value(&platform)
                .map_err(|e| AppError::Internal(e.to_string()))?),
            preferences: Set(serde_json::to_value(NotificationPreferences::default())
                .map_err(|e| AppError::Internal(e.to_string()))?),
            is_active: Set(true),
            total_pushes: Set(0),
            successful_pushes: Set(0),
            failed_pushes: Set(0),
            last_push_sent_at: Set(None),
            last_push_success_at: Set(None),
            last_error: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(None),
            last_used_at: Set(Some(now.into())),
        };

        let created = self.repo.create(subscription).await?;
        get_metrics().record_subscription_registered();
        tracing::info!(user_id, endpoint = %created.endpoint, "Registered push subscription");
        Ok(created.into())
    }

    /// Remove one subscription by endpoint.
    pub async fn unregister(&self, user_id: &str, endpoint: &str) -> AppResult<()> {
        let deleted = self
            .repo
            .delete_by_user_and_endpoint(user_id, endpoint)
            .await?;
        if deleted == 0 {
            return Err(AppError::SubscriptionNotFound(
                "no subscription for this endpoint".to_string(),
            ));
        }
        get_metrics().record_subscriptions_removed(deleted);
        Ok(())
    }

    /// Remove every subscription for a user (log out everywhere).
    pub async fn unregister_all(&self, user_id: &str) -> AppResult<u64> {
        let deleted = self.repo.delete_by_user(user_id).await?;
        get_metrics().record_subscriptions_removed(deleted);
        Ok(deleted)
    }

    /// List a user's active subscriptions. Keys are stripped from the
    /// response type.
    pub async fn list_active(&self, user_id: &str) -> AppResult<Vec<SubscriptionResponse>> {
        let subscriptions = self.repo.find_active_by_user(user_id).await?;
        Ok(subscriptions.into_iter().map(Into::into).collect())
    }

    /// Deactivate every subscription whose expiration hint has passed.
    pub async fn cleanup_expired(&self) -> AppResult<u64> {
        let count = self.repo.deactivate_expired().await?;
        if count > 0 {
            get_metrics().record_subscriptions_deactivated(count);
            tracing::info!(count, "Deactivated expired push subscriptions");
        }
        Ok(count)
    }

    /// Active subscription counts grouped by school, for admin reporting.
    pub async fn school_stats(&self) -> AppResult<Vec<SchoolSubscriptionCount>> {
        self.repo.count_active_by_school().await
    }

    /// Deliver a short-TTL test payload to all of a user's active
    /// subscriptions.
    pub async fn send_test(
        &self,
        user_id: &str,
        title: Option<String>,
        body: Option<String>,
    ) -> AppResult<BatchSummary> {
        if self.channel.is_none() {
            return Err(AppError::PushNotConfigured);
        }

        let input = PushMessageInput {
            title: Some(title.unwrap_or_else(|| "GradeBook test".to_string())),
            body: Some(body.unwrap_or_else(|| "Push notifications are working".to_string())),
            ..PushMessageInput::default()
        };

        let subscriptions = self.repo.find_active_by_user(user_id).await?;
        self.send_to_subscriptions(subscriptions, &input, TEST_TTL_SECS)
            .await
    }

    /// Deliver a notification payload to a user's active subscriptions
    /// whose preferences enable the payload's category.
    pub async fn send_to_user(
        &self,
        user_id: &str,
        input: &PushMessageInput,
    ) -> AppResult<BatchSummary> {
        if self.channel.is_none() {
            return Err(AppError::PushNotConfigured);
        }

        let mut subscriptions = self.repo.find_active_by_user(user_id).await?;
        if let Some(category) = input.category {
            subscriptions.retain(|s| s.notification_preferences().enables(category));
        }

        self.send_to_subscriptions(subscriptions, input, DEFAULT_TTL_SECS)
            .await
    }

    /// Fan one payload out to a set of subscriptions and deactivate the
    /// ones the push service reported gone.
    async fn send_to_subscriptions(
        &self,
        subscriptions: Vec<push_subscription::Model>,
        input: &PushMessageInput,
        ttl_secs: u32,
    ) -> AppResult<BatchSummary> {
        let transport = self
            .channel
            .as_ref()
            .map(|c| Arc::clone(&c.transport))
            .ok_or(AppError::PushNotConfigured)?;

        if subscriptions.is_empty() {
            return Ok(BatchSummary::default());
        }

        let results = dispatch_batch(transport, &subscriptions, input, ttl_secs).await;

        let now = Utc::now();
        let mut summary = BatchSummary {
            total: results.len(),
            ..BatchSummary::default()
        };
        let mut expired_endpoints = Vec::new();

        // Results arrive in settle order; tally by iterating them, never
        // by position.
        for (subscription, outcome) in &results {
            if outcome.is_delivered() {
                summary.successful += 1;
            } else {
                summary.failed += 1;
                if outcome.is_expired() {
                    summary.expired += 1;
                    expired_endpoints.push(subscription.endpoint.clone());
                }
            }
            get_metrics().record_push_outcome(outcome.is_delivered(), outcome.is_expired());

            // Telemetry is best-effort: a stats write failure never fails
            // the send.
            if let Err(e) = self
                .repo
                .record_attempt(
                    &subscription.id,
                    outcome.is_delivered(),
                    outcome.last_error(now).as_ref(),
                )
                .await
            {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    error = %e,
                    "Failed to record push telemetry"
                );
            }
        }

        if !expired_endpoints.is_empty() {
            let deactivated = self.repo.deactivate_by_endpoints(&expired_endpoints).await?;
            get_metrics().record_subscriptions_deactivated(deactivated);
            tracing::debug!(
                count = deactivated,
                "Deactivated subscriptions reported gone by the push service"
            );
        }

        tracing::info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            expired = summary.expired,
            "Push batch settled"
        );

        Ok(summary)
    }
}

/// Dispatch one payload to every subscription concurrently and wait for
/// all sends to settle.
///
/// Each send runs in its own task so a hung transport call delays only
/// its own item. A task that panics (a non-conforming transport) is
/// counted as a failed outcome rather than aborting the batch.
async fn dispatch_batch(
    transport: Arc<dyn PushTransport>,
    subscriptions: &[push_subscription::Model],
    input: &PushMessageInput,
    ttl_secs: u32,
) -> Vec<(push_subscription::Model, SendOutcome)> {
    // One capture time for the whole batch.
    let timestamp = Utc::now();
    let urgency = if input.urgent {
        Urgency::High
    } else {
        Urgency::Normal
    };

    let handles: Vec<_> = subscriptions
        .iter()
        .map(|subscription| {
            let platform = Platform::resolve(&subscription.platform_info());
            let payload = shape_payload(platform, input, timestamp);
            let target = PushTarget {
                endpoint: subscription.endpoint.clone(),
                p256dh: subscription.p256dh.clone(),
                auth: subscription.auth.clone(),
            };
            let options = DeliveryOptions { ttl_secs, urgency };
            let transport = Arc::clone(&transport);

            tokio::spawn(async move {
                let body = match serde_json::to_vec(&payload) {
                    Ok(body) => body,
                    Err(e) => {
                        return SendOutcome::Failed {
                            status: None,
                            message: format!("payload serialization failed: {e}"),
                        };
                    }
                };
                SendOutcome::classify(transport.deliver(&target, &body, &options).await)
            })
        })
        .collect();

    let settled = join_all(handles).await;

    subscriptions
        .iter()
        .cloned()
        .zip(settled)
        .map(|(subscription, joined)| {
            let outcome = joined.unwrap_or_else(|e| SendOutcome::Failed {
                status: None,
                message: format!("send task failed: {e}"),
            });
            (subscription, outcome)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transport that replays scripted outcomes keyed by endpoint.
    struct ScriptedTransport {
        outcomes: HashMap<String, Result<DeliveryReceipt, TransportError>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(outcomes: HashMap<String, Result<DeliveryReceipt, TransportError>>) -> Self {
            Self {
                outcomes,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PushTransport for ScriptedTransport {
        async fn deliver(
            &self,
            target: &PushTarget,
            _payload: &[u8],
            _options: &DeliveryOptions,
        ) -> Result<DeliveryReceipt, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .get(&target.endpoint)
                .cloned()
                .unwrap_or(Ok(DeliveryReceipt { status_code: 201 }))
        }
    }

    /// Transport that panics, simulating a non-conforming implementation.
    struct PanickingTransport;

    #[async_trait]
    impl PushTransport for PanickingTransport {
        #[allow(clippy::panic)]
        async fn deliver(
            &self,
            target: &PushTarget,
            _payload: &[u8],
            _options: &DeliveryOptions,
        ) -> Result<DeliveryReceipt, TransportError> {
            if target.endpoint.contains("broken") {
                panic!("transport bug");
            }
            Ok(DeliveryReceipt { status_code: 201 })
        }
    }

    fn settings(email: Option<&str>, public: Option<&str>, private: Option<&str>) -> PushSettings {
        PushSettings {
            subject_email: email.map(ToString::to_string),
            public_key: public.map(ToString::to_string),
            private_key: private.map(ToString::to_string),
            cleanup_interval_secs: 3600,
        }
    }

    fn valid_public_key() -> String {
        format!("B{}", "a".repeat(86))
    }

    fn valid_private_key() -> String {
        "b".repeat(43)
    }

    fn subscription(id: &str, endpoint: &str, platform: PlatformInfo) -> push_subscription::Model {
        push_subscription::Model {
            id: id.to_string(),
            user_id: "u1".to_string(),
            school_id: Some("school1".to_string()),
            endpoint: endpoint.to_string(),
            p256dh: "p256dh-key".to_string(),
            auth: "auth-key".to_string(),
            expiration_time: None,
            user_agent: None,
            platform: serde_json::to_value(platform).unwrap(),
            preferences: serde_json::to_value(NotificationPreferences::default()).unwrap(),
            is_active: true,
            total_pushes: 0,
            successful_pushes: 0,
            failed_pushes: 0,
            last_push_sent_at: None,
            last_push_success_at: None,
            last_error: None,
            created_at: Utc::now().into(),
            updated_at: None,
            last_used_at: None,
        }
    }

    fn service_with(
        db: MockDatabase,
        channel: Option<PushChannel>,
    ) -> PushNotificationService {
        let repo = PushSubscriptionRepository::new(Arc::new(db.into_connection()));
        PushNotificationService::new(repo, channel)
    }

    fn channel(transport: Arc<dyn PushTransport>) -> PushChannel {
        PushChannel {
            public_key: valid_public_key(),
            transport,
        }
    }

    fn transport_error(status: Option<u16>) -> TransportError {
        TransportError {
            status_code: status,
            message: "scripted failure".to_string(),
        }
    }

    // === VAPID validation ===

    #[test]
    fn test_vapid_valid_credentials() {
        let config = VapidConfig::from_settings(&settings(
            Some("admin@school.example"),
            Some(&valid_public_key()),
            Some(&valid_private_key()),
        ))
        .unwrap();
        assert_eq!(config.subject, "mailto:admin@school.example");
        assert_eq!(config.public_key.len(), 87);
    }

    #[test]
    fn test_vapid_keeps_existing_mailto_prefix() {
        let config = VapidConfig::from_settings(&settings(
            Some("mailto:admin@school.example"),
            Some(&valid_public_key()),
            Some(&valid_private_key()),
        ))
        .unwrap();
        assert_eq!(config.subject, "mailto:admin@school.example");
    }

    #[test]
    fn test_vapid_rejects_missing_fields() {
        assert!(VapidConfig::from_settings(&settings(None, None, None)).is_none());
        assert!(
            VapidConfig::from_settings(&settings(
                Some("admin@school.example"),
                Some(&valid_public_key()),
                None,
            ))
            .is_none()
        );
    }

    #[test]
    fn test_vapid_rejects_malformed_keys() {
        // Wrong public key length
        assert!(
            VapidConfig::from_settings(&settings(
                Some("admin@school.example"),
                Some("Bshort"),
                Some(&valid_private_key()),
            ))
            .is_none()
        );
        // Wrong leading character
        let wrong_prefix = format!("A{}", "a".repeat(86));
        assert!(
            VapidConfig::from_settings(&settings(
                Some("admin@school.example"),
                Some(&wrong_prefix),
                Some(&valid_private_key()),
            ))
            .is_none()
        );
        // Wrong private key length
        assert!(
            VapidConfig::from_settings(&settings(
                Some("admin@school.example"),
                Some(&valid_public_key()),
                Some("tiny"),
            ))
            .is_none()
        );
        // Email without a dot
        assert!(
            VapidConfig::from_settings(&settings(
                Some("admin@localhost"),
                Some(&valid_public_key()),
                Some(&valid_private_key()),
            ))
            .is_none()
        );
    }

    // === Platform resolution and payload shaping ===

    #[test]
    fn test_platform_precedence_ios_first() {
        let both = PlatformInfo {
            is_ios: true,
            is_android: true,
            ..PlatformInfo::default()
        };
        assert_eq!(Platform::resolve(&both), Platform::Ios);

        let android = PlatformInfo {
            is_android: true,
            ..PlatformInfo::default()
        };
        assert_eq!(Platform::resolve(&android), Platform::Android);

        assert_eq!(Platform::resolve(&PlatformInfo::default()), Platform::Desktop);
    }

    #[test]
    fn test_shape_payload_ios_has_no_vibration() {
        let input = PushMessageInput {
            notification_id: Some("n1".to_string()),
            urgent: true,
            ..PushMessageInput::default()
        };
        let payload = shape_payload(Platform::Ios, &input, Utc::now());
        assert_eq!(payload.tag, "ios-n1");
        assert!(payload.urgent);
        assert!(payload.vibrate.is_none());
    }

    #[test]
    fn test_shape_payload_android_vibration_patterns() {
        let urgent = PushMessageInput {
            notification_id: Some("n1".to_string()),
            urgent: true,
            ..PushMessageInput::default()
        };
        let payload = shape_payload(Platform::Android, &urgent, Utc::now());
        assert_eq!(payload.tag, "android-n1");
        assert_eq!(payload.vibrate, Some(vec![100, 50, 100, 50, 100]));

        let calm = PushMessageInput {
            notification_id: Some("n1".to_string()),
            ..PushMessageInput::default()
        };
        let payload = shape_payload(Platform::Android, &calm, Utc::now());
        assert_eq!(payload.vibrate, Some(vec![200, 100, 200]));
    }

    #[test]
    fn test_shape_payload_defaults_and_timestamp_tag() {
        let timestamp = Utc::now();
        let payload = shape_payload(Platform::Desktop, &PushMessageInput::default(), timestamp);
        assert_eq!(payload.title, "GradeBook");
        assert_eq!(payload.body, "New notification");
        assert_eq!(payload.url, "/app/notifications");
        assert_eq!(
            payload.tag,
            format!("desktop-{}", timestamp.timestamp_millis())
        );
        assert_eq!(payload.timestamp, timestamp.timestamp_millis());
    }

    // === Outcome classification ===

    #[test]
    fn test_classify_delivery_outcomes() {
        let delivered = SendOutcome::classify(Ok(DeliveryReceipt { status_code: 201 }));
        assert_eq!(delivered, SendOutcome::Delivered { status: 201 });

        let gone = SendOutcome::classify(Err(transport_error(Some(410))));
        assert_eq!(gone, SendOutcome::Expired { status: 410 });

        let missing = SendOutcome::classify(Err(transport_error(Some(404))));
        assert_eq!(missing, SendOutcome::Expired { status: 404 });

        let server_error = SendOutcome::classify(Err(transport_error(Some(500))));
        assert!(matches!(
            server_error,
            SendOutcome::Failed {
                status: Some(500),
                ..
            }
        ));

        let no_status = SendOutcome::classify(Err(transport_error(None)));
        assert!(matches!(no_status, SendOutcome::Failed { status: None, .. }));
    }

    // === Batch fan-out ===

    #[tokio::test]
    async fn test_dispatch_batch_partial_tolerance() {
        let subs = vec![
            subscription("s1", "https://push.example/ok", PlatformInfo::default()),
            subscription("s2", "https://push.example/gone", PlatformInfo::default()),
            subscription("s3", "https://push.example/flaky", PlatformInfo::default()),
        ];
        let mut outcomes = HashMap::new();
        outcomes.insert(
            "https://push.example/ok".to_string(),
            Ok(DeliveryReceipt { status_code: 201 }),
        );
        outcomes.insert(
            "https://push.example/gone".to_string(),
            Err(transport_error(Some(410))),
        );
        outcomes.insert(
            "https://push.example/flaky".to_string(),
            Err(transport_error(Some(500))),
        );
        let transport: Arc<dyn PushTransport> = Arc::new(ScriptedTransport::new(outcomes));

        let results = dispatch_batch(
            Arc::clone(&transport),
            &subs,
            &PushMessageInput::default(),
            DEFAULT_TTL_SECS,
        )
        .await;

        assert_eq!(results.len(), 3);
        let delivered = results.iter().filter(|(_, o)| o.is_delivered()).count();
        let expired = results.iter().filter(|(_, o)| o.is_expired()).count();
        assert_eq!(delivered, 1);
        assert_eq!(expired, 1);

        let expired_ids: Vec<_> = results
            .iter()
            .filter(|(_, o)| o.is_expired())
            .map(|(s, _)| s.id.as_str())
            .collect();
        assert_eq!(expired_ids, vec!["s2"]);
    }

    #[tokio::test]
    async fn test_dispatch_batch_counts_panicked_task_as_failed() {
        let subs = vec![
            subscription("s1", "https://push.example/fine1", PlatformInfo::default()),
            subscription("s2", "https://push.example/broken", PlatformInfo::default()),
            subscription("s3", "https://push.example/fine2", PlatformInfo::default()),
        ];
        let transport: Arc<dyn PushTransport> = Arc::new(PanickingTransport);

        let results = dispatch_batch(
            transport,
            &subs,
            &PushMessageInput::default(),
            DEFAULT_TTL_SECS,
        )
        .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_delivered());
        assert!(matches!(results[1].1, SendOutcome::Failed { .. }));
        assert!(results[2].1.is_delivered());
    }

    // === Configuration gate ===

    #[tokio::test]
    async fn test_not_configured_fails_fast_without_transport_calls() {
        let service = service_with(MockDatabase::new(DatabaseBackend::Postgres), None);

        match service.public_key() {
            Err(AppError::PushNotConfigured) => {}
            other => panic!("Expected PushNotConfigured, got {other:?}"),
        }

        let result = service
            .send_to_subscriptions(
                vec![subscription(
                    "s1",
                    "https://push.example/ep",
                    PlatformInfo::default(),
                )],
                &PushMessageInput::default(),
                DEFAULT_TTL_SECS,
            )
            .await;
        match result {
            Err(AppError::PushNotConfigured) => {}
            other => panic!("Expected PushNotConfigured, got {other:?}"),
        }
    }

    // === Registration validation ===

    #[tokio::test]
    async fn test_register_rejects_missing_endpoint() {
        let transport: Arc<dyn PushTransport> = Arc::new(ScriptedTransport::new(HashMap::new()));
        let service = service_with(
            MockDatabase::new(DatabaseBackend::Postgres),
            Some(channel(transport)),
        );

        let input = RegisterSubscriptionInput {
            endpoint: "  ".to_string(),
            keys: Some(SubscriptionKeys {
                p256dh: "p".to_string(),
                auth: "a".to_string(),
            }),
            expiration_time: None,
            platform: None,
        };
        let result = service.register("u1", Some("school1"), input, None).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_register_rejects_incomplete_keys() {
        let transport: Arc<dyn PushTransport> = Arc::new(ScriptedTransport::new(HashMap::new()));
        let service = service_with(
            MockDatabase::new(DatabaseBackend::Postgres),
            Some(channel(transport)),
        );

        let missing_auth = RegisterSubscriptionInput {
            endpoint: "https://push.example/ep".to_string(),
            keys: Some(SubscriptionKeys {
                p256dh: "p".to_string(),
                auth: String::new(),
            }),
            expiration_time: None,
            platform: None,
        };
        let result = service
            .register("u1", Some("school1"), missing_auth, None)
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let no_keys = RegisterSubscriptionInput {
            endpoint: "https://push.example/ep".to_string(),
            keys: None,
            expiration_time: None,
            platform: None,
        };
        let result = service.register("u1", Some("school1"), no_keys, None).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_register_refreshes_existing_endpoint() {
        let existing = subscription("s1", "https://push.example/ep", PlatformInfo::default());
        let mut refreshed = existing.clone();
        refreshed.p256dh = "new-p256dh".to_string();
        refreshed.auth = "new-auth".to_string();
        refreshed.updated_at = Some(Utc::now().into());

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existing]])
            .append_query_results([vec![refreshed]]);
        let transport: Arc<dyn PushTransport> = Arc::new(ScriptedTransport::new(HashMap::new()));
        let service = service_with(db, Some(channel(transport)));

        let input = RegisterSubscriptionInput {
            endpoint: "https://push.example/ep".to_string(),
            keys: Some(SubscriptionKeys {
                p256dh: "new-p256dh".to_string(),
                auth: "new-auth".to_string(),
            }),
            expiration_time: None,
            platform: None,
        };
        let response = service
            .register("u1", Some("school1"), input, None)
            .await
            .unwrap();
        assert_eq!(response.id, "s1");
        assert_eq!(response.endpoint, "https://push.example/ep");
    }

    // === Unregister ===

    #[tokio::test]
    async fn test_unregister_unknown_endpoint_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            // delete matches no rows
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }]);
        let service = service_with(db, None);

        let result = service
            .unregister("u1", "https://push.example/already-gone")
            .await;
        assert!(matches!(result, Err(AppError::SubscriptionNotFound(_))));
    }

    // === Response shape ===

    #[test]
    fn test_subscription_response_strips_keys() {
        let model = subscription("s1", "https://push.example/ep", PlatformInfo::default());
        let response: SubscriptionResponse = model.into();
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["endpoint"], "https://push.example/ep");
        assert!(json.get("p256dh").is_none());
        assert!(json.get("auth").is_none());
        assert!(json.get("keys").is_none());
    }

    // === End-to-end: expired subscription is deactivated ===

    #[tokio::test]
    async fn test_send_test_deactivates_expired_subscription() {
        let sub = subscription("s1", "https://push.example/gone", PlatformInfo::default());
        let mut recorded = sub.clone();
        recorded.total_pushes = 1;
        recorded.failed_pushes = 1;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            // find_active_by_user
            .append_query_results([vec![sub.clone()]])
            // record_attempt: get_by_id, then update returning
            .append_query_results([vec![sub.clone()]])
            .append_query_results([vec![recorded]])
            // deactivate_by_endpoints
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }]);

        let mut outcomes = HashMap::new();
        outcomes.insert(
            "https://push.example/gone".to_string(),
            Err(transport_error(Some(410))),
        );
        let transport: Arc<dyn PushTransport> = Arc::new(ScriptedTransport::new(outcomes));
        let service = service_with(db, Some(channel(transport)));

        let summary = service.send_test("u1", None, None).await.unwrap();
        assert_eq!(
            summary,
            BatchSummary {
                total: 1,
                successful: 0,
                failed: 1,
                expired: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_send_to_user_respects_category_preferences() {
        let muted_grades = NotificationPreferences {
            grades: false,
            ..NotificationPreferences::default()
        };
        let mut sub = subscription("s1", "https://push.example/ep", PlatformInfo::default());
        sub.preferences = serde_json::to_value(muted_grades).unwrap();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![sub]]);
        let transport = Arc::new(ScriptedTransport::new(HashMap::new()));
        let calls = Arc::clone(&transport);
        let service = service_with(
            db,
            Some(channel(transport as Arc<dyn PushTransport>)),
        );

        let input = PushMessageInput {
            category: Some(NotificationCategory::Grade),
            ..PushMessageInput::default()
        };
        let summary = service.send_to_user("u1", &input).await.unwrap();

        // The only subscription has grades muted: nothing is sent.
        assert_eq!(summary, BatchSummary::default());
        assert_eq!(calls.calls.load(Ordering::SeqCst), 0);
    }
}
