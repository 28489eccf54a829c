//! Database repositories.

pub mod notification;
pub mod push_subscription;
pub mod user;

pub use notification::NotificationRepository;
pub use push_subscription::{PushSubscriptionRepository, SchoolSubscriptionCount};
pub use user::UserRepository;
