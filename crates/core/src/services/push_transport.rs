//! Push transport abstraction over the Web Push protocol.
//!
//! The delivery service talks to a [`PushTransport`] trait object so the
//! wire client can be swapped out in tests. The production implementation
//! wraps the `web-push` crate.

use async_trait::async_trait;
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessageBuilder,
};

use gradebook_common::{AppError, AppResult};

/// Where to deliver one push message: the subscription's transport identity.
#[derive(Debug, Clone)]
pub struct PushTarget {
    /// Push service URL
    pub endpoint: String,
    /// P256DH encryption key
    pub p256dh: String,
    /// Auth encryption key
    pub auth: String,
}

/// Message urgency forwarded to the push service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    /// Deliver whenever convenient
    Normal,
    /// Deliver immediately, may wake the device
    High,
}

/// Per-delivery options.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryOptions {
    /// How long the push service should retain an undelivered message.
    pub ttl_secs: u32,
    /// Urgency header value.
    pub urgency: Urgency,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            ttl_secs: 86_400,
            urgency: Urgency::Normal,
        }
    }
}

/// Receipt returned by the push service on accepted delivery.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryReceipt {
    /// HTTP status returned by the push service.
    pub status_code: u16,
}

/// Structured transport failure.
///
/// Carries the push service's status code when one was received; `None`
/// means the failure happened before a response (I/O, TLS, bad key).
#[derive(Debug, Clone, thiserror::Error)]
#[error("push transport error{}: {message}", status_code.map(|c| format!(" ({c})")).unwrap_or_default())]
pub struct TransportError {
    /// HTTP status code from the push service, if any.
    pub status_code: Option<u16>,
    /// Human-readable detail for operator logs.
    pub message: String,
}

/// Asynchronous push delivery transport.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Deliver one serialized payload to one subscription.
    async fn deliver(
        &self,
        target: &PushTarget,
        payload: &[u8],
        options: &DeliveryOptions,
    ) -> Result<DeliveryReceipt, TransportError>;
}

/// Production transport backed by the `web-push` crate (Isahc client).
pub struct WebPushTransport {
    client: IsahcWebPushClient,
    subject: String,
    private_key: String,
}

impl WebPushTransport {
    /// Create a transport from validated VAPID credentials.
    pub fn new(subject: String, private_key: String) -> AppResult<Self> {
        let client = IsahcWebPushClient::new()
            .map_err(|e| AppError::Config(format!("Failed to create web push client: {e}")))?;

        Ok(Self {
            client,
            subject,
            private_key,
        })
    }
}

/// Map a `web-push` error to the status code the push service answered with.
fn status_code_of(error: &WebPushError) -> Option<u16> {
    match error {
        WebPushError::EndpointNotValid(info)
        | WebPushError::EndpointNotFound(info)
        | WebPushError::Unauthorized(info)
        | WebPushError::BadRequest(info)
        | WebPushError::NotImplemented(info)
        | WebPushError::Other(info) => Some(info.code),
        WebPushError::ServerError { info, .. } => Some(info.code),
        _ => None,
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn deliver(
        &self,
        target: &PushTarget,
        payload: &[u8],
        options: &DeliveryOptions,
    ) -> Result<DeliveryReceipt, TransportError> {
        let subscription_info = SubscriptionInfo::new(
            target.endpoint.clone(),
            target.p256dh.clone(),
            target.auth.clone(),
        );

        let mut signature =
            VapidSignatureBuilder::from_base64(&self.private_key, &subscription_info).map_err(
                |e| TransportError {
                    status_code: None,
                    message: format!("Invalid VAPID private key: {e}"),
                },
            )?;
        signature.add_claim("sub", self.subject.clone());

        let signature = signature.build().map_err(|e| TransportError {
            status_code: None,
            message: format!("Failed to build VAPID signature: {e}"),
        })?;

        let mut builder = WebPushMessageBuilder::new(&subscription_info);
        builder.set_vapid_signature(signature);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_ttl(options.ttl_secs);
        builder.set_urgency(match options.urgency {
            Urgency::Normal => web_push::Urgency::Normal,
            Urgency::High => web_push::Urgency::High,
        });

        let message = builder.build().map_err(|e| TransportError {
            status_code: None,
            message: format!("Failed to build push message: {e}"),
        })?;

        match self.client.send(message).await {
            // Push services answer 201 Created for accepted messages.
            Ok(()) => Ok(DeliveryReceipt { status_code: 201 }),
            Err(e) => Err(TransportError {
                status_code: status_code_of(&e),
                message: e.to_string(),
            }),
        }
    }
}
