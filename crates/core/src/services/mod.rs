//! Business logic services.

#![allow(missing_docs)]

pub mod notification;
pub mod push_notification;
pub mod push_transport;
pub mod user;

pub use notification::{CreateNotificationInput, NotificationResponse, NotificationService};
pub use push_notification::{
    BatchSummary, Platform, PushChannel, PushConfigResponse, PushMessageInput,
    PushNotificationService, RegisterSubscriptionInput, SendOutcome, SubscriptionKeys,
    SubscriptionResponse, VapidConfig, WebPushPayload,
};
pub use push_transport::{
    DeliveryOptions, DeliveryReceipt, PushTarget, PushTransport, TransportError, Urgency,
    WebPushTransport,
};
pub use user::UserService;
