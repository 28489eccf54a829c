//! Notification creation and delivery orchestration.

use chrono::Utc;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use validator::Validate;

use gradebook_common::{AppError, AppResult, IdGenerator, get_metrics};
use gradebook_db::entities::notification::{self, NotificationCategory};
use gradebook_db::repositories::{NotificationRepository, UserRepository};

use crate::services::push_notification::{BatchSummary, PushMessageInput, PushNotificationService};

/// Input for creating a notification.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationInput {
    /// Recipient user ID
    #[validate(length(min = 1, message = "userId is required"))]
    pub user_id: String,
    /// Notification title
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub title: String,
    /// Notification body
    #[validate(length(min = 1, max = 2000, message = "body must be 1-2000 characters"))]
    pub body: String,
    /// Notification category
    pub category: NotificationCategory,
    /// Optional click-through URL
    pub url: Option<String>,
}

/// Notification data returned to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

impl From<notification::Model> for NotificationResponse {
    fn from(model: notification::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            title: model.title,
            body: model.body,
            category: model.category,
            url: model.url,
            is_read: model.is_read,
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// Notification service.
#[derive(Clone)]
pub struct NotificationService {
    notification_repo: NotificationRepository,
    user_repo: UserRepository,
    push_service: PushNotificationService,
    id_gen: IdGenerator,
}

impl NotificationService {
    /// Create a new notification service.
    #[must_use]
    pub fn new(
        notification_repo: NotificationRepository,
        user_repo: UserRepository,
        push_service: PushNotificationService,
    ) -> Self {
        Self {
            notification_repo,
            user_repo,
            push_service,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a notification and fan it out to the recipient's push
    /// subscriptions.
    ///
    /// The notification row is the source of truth; push delivery is
    /// best-effort and never fails creation.
    pub async fn create(
        &self,
        input: CreateNotificationInput,
    ) -> AppResult<(NotificationResponse, BatchSummary)> {
        input.validate()?;

        let recipient = self.user_repo.get_by_id(&input.user_id).await?;

        let now = Utc::now();
        let model = notification::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(recipient.id.clone()),
            school_id: Set(recipient.school_id.clone()),
            title: Set(input.title),
            body: Set(input.body),
            category: Set(input.category),
            url: Set(input.url),
            is_read: Set(false),
            created_at: Set(now.into()),
        };
        let created = self.notification_repo.create(model).await?;
        get_metrics().record_notification_created();

        let push_input = PushMessageInput {
            title: Some(created.title.clone()),
            body: Some(created.body.clone()),
            url: created.url.clone(),
            notification_id: Some(created.id.clone()),
            category: Some(created.category),
            urgent: created.category == NotificationCategory::Urgent,
        };

        let summary = match self.push_service.send_to_user(&recipient.id, &push_input).await {
            Ok(summary) => summary,
            Err(AppError::PushNotConfigured) => {
                tracing::debug!("Push delivery disabled, notification stored only");
                BatchSummary::default()
            }
            Err(e) => {
                tracing::warn!(
                    notification_id = %created.id,
                    error = %e,
                    "Push fan-out failed"
                );
                BatchSummary::default()
            }
        };

        Ok((created.into(), summary))
    }

    /// List a user's notifications, newest first.
    pub async fn list(&self, user_id: &str, limit: u64) -> AppResult<Vec<NotificationResponse>> {
        let notifications = self.notification_repo.find_by_user(user_id, limit).await?;
        Ok(notifications.into_iter().map(Into::into).collect())
    }

    /// Mark a notification as read. Only the recipient may do so.
    pub async fn mark_read(&self, user_id: &str, id: &str) -> AppResult<NotificationResponse> {
        let notification = self.notification_repo.get_by_id(id).await?;
        if notification.user_id != user_id {
            return Err(AppError::Forbidden(
                "cannot modify another user's notification".to_string(),
            ));
        }

        let updated = self.notification_repo.mark_read(id).await?;
        Ok(updated.into())
    }

    /// Count a user's unread notifications.
    pub async fn unread_count(&self, user_id: &str) -> AppResult<u64> {
        self.notification_repo.count_unread(user_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use gradebook_db::entities::user::{self, UserRole};
    use gradebook_db::repositories::PushSubscriptionRepository;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;

    fn service(db: MockDatabase) -> NotificationService {
        let conn = Arc::new(db.into_connection());
        let push = PushNotificationService::new(
            PushSubscriptionRepository::new(Arc::clone(&conn)),
            None,
        );
        NotificationService::new(
            NotificationRepository::new(Arc::clone(&conn)),
            UserRepository::new(conn),
            push,
        )
    }

    fn teacher() -> user::Model {
        user::Model {
            id: "u1".to_string(),
            username: "ms.rivera".to_string(),
            email: Some("rivera@school.example".to_string()),
            name: Some("Ms. Rivera".to_string()),
            role: UserRole::Teacher,
            school_id: Some("school1".to_string()),
            token: None,
            is_active: true,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn notification_model(id: &str, user_id: &str) -> notification::Model {
        notification::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            school_id: Some("school1".to_string()),
            title: "Grade posted".to_string(),
            body: "Math quiz graded".to_string(),
            category: NotificationCategory::Grade,
            url: None,
            is_read: false,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input() {
        let db = MockDatabase::new(DatabaseBackend::Postgres);
        let input = CreateNotificationInput {
            user_id: "u1".to_string(),
            title: String::new(),
            body: "body".to_string(),
            category: NotificationCategory::Grade,
            url: None,
        };
        let result = service(db).create(input).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_fails_for_unknown_recipient() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<user::Model>::new()]);
        let input = CreateNotificationInput {
            user_id: "ghost".to_string(),
            title: "Grade posted".to_string(),
            body: "Math quiz graded".to_string(),
            category: NotificationCategory::Grade,
            url: None,
        };
        let result = service(db).create(input).await;
        assert!(matches!(result, Err(AppError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn test_create_stores_notification_when_push_disabled() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![teacher()]])
            .append_query_results([vec![notification_model("n1", "u1")]]);
        let input = CreateNotificationInput {
            user_id: "u1".to_string(),
            title: "Grade posted".to_string(),
            body: "Math quiz graded".to_string(),
            category: NotificationCategory::Grade,
            url: None,
        };
        let (response, summary) = service(db).create(input).await.unwrap();
        assert_eq!(response.id, "n1");
        assert!(!response.is_read);
        assert_eq!(summary, BatchSummary::default());
    }

    #[tokio::test]
    async fn test_mark_read_rejects_other_users() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![notification_model("n1", "u1")]]);
        let result = service(db).mark_read("intruder", "n1").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
