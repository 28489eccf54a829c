//! Push subscription repository.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, SqlErr, sea_query::Expr,
};

use crate::entities::push_subscription::{ActiveModel, Column, Entity, LastError, Model};
use gradebook_common::{AppError, AppResult};

/// Active subscription count for one school, used by admin reporting.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolSubscriptionCount {
    /// Tenant scope. `None` groups super-admin-scoped subscriptions.
    pub school_id: Option<String>,
    /// Number of active subscriptions in that scope.
    pub active_subscriptions: i64,
}

/// Repository for push subscription operations.
#[derive(Clone)]
pub struct PushSubscriptionRepository {
    db: Arc<DatabaseConnection>,
}

impl PushSubscriptionRepository {
    /// Create a new push subscription repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a push subscription by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<Model>> {
        Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a push subscription by ID or return an error.
    pub async fn get_by_id(&self, id: &str) -> AppResult<Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::SubscriptionNotFound(id.to_string()))
    }

    /// Find a subscription by owner and endpoint.
    pub async fn find_by_user_and_endpoint(
        &self,
        user_id: &str,
        endpoint: &str,
    ) -> AppResult<Option<Model>> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Endpoint.eq(endpoint))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find all active subscriptions for a user.
    pub async fn find_active_by_user(&self, user_id: &str) -> AppResult<Vec<Model>> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::IsActive.eq(true))
            .order_by_desc(Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new push subscription.
    ///
    /// Registration is a two-step find-then-insert, so two concurrent
    /// registers for the same brand-new endpoint can race into the unique
    /// index. The violation is translated here rather than surfacing as a
    /// raw storage error.
    pub async fn create(&self, subscription: ActiveModel) -> AppResult<Model> {
        subscription.insert(self.db.as_ref()).await.map_err(|e| {
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                AppError::Conflict(
                    "A subscription already exists for this endpoint".to_string(),
                )
            } else {
                AppError::Database(e.to_string())
            }
        })
    }

    /// Update a push subscription.
    pub async fn update(&self, subscription: ActiveModel) -> AppResult<Model> {
        subscription
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a subscription by owner and endpoint. Returns deleted row count.
    pub async fn delete_by_user_and_endpoint(
        &self,
        user_id: &str,
        endpoint: &str,
    ) -> AppResult<u64> {
        let result = Entity::delete_many()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Endpoint.eq(endpoint))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }

    /// Delete all subscriptions for a user. Returns deleted row count.
    pub async fn delete_by_user(&self, user_id: &str) -> AppResult<u64> {
        let result = Entity::delete_many()
            .filter(Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }

    /// Deactivate every subscription whose endpoint is in the given set.
    ///
    /// Used after a batch send to stop retrying endpoints the push service
    /// reported as gone.
    pub async fn deactivate_by_endpoints(&self, endpoints: &[String]) -> AppResult<u64> {
        if endpoints.is_empty() {
            return Ok(0);
        }

        let result = Entity::update_many()
            .col_expr(Column::IsActive, Expr::value(false))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Endpoint.is_in(endpoints.to_vec()))
            .filter(Column::IsActive.eq(true))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }

    /// Deactivate every active subscription whose browser-supplied
    /// expiration time has passed. Idempotent bulk state transition.
    pub async fn deactivate_expired(&self) -> AppResult<u64> {
        let result = Entity::update_many()
            .col_expr(Column::IsActive, Expr::value(false))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::ExpirationTime.lt(Utc::now()))
            .filter(Column::IsActive.eq(true))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }

    /// Record the outcome of one send attempt on a subscription's telemetry.
    pub async fn record_attempt(
        &self,
        id: &str,
        success: bool,
        error: Option<&LastError>,
    ) -> AppResult<Model> {
        let subscription = self.get_by_id(id).await?;
        let now = Utc::now();

        let total = subscription.total_pushes;
        let successful = subscription.successful_pushes;
        let failed = subscription.failed_pushes;

        let mut active: ActiveModel = subscription.into();
        active.total_pushes = Set(total + 1);
        active.last_push_sent_at = Set(Some(now.into()));

        if success {
            active.successful_pushes = Set(successful + 1);
            active.last_push_success_at = Set(Some(now.into()));
            active.last_error = Set(None);
        } else {
            active.failed_pushes = Set(failed + 1);
            if let Some(err) = error {
                let value = serde_json::to_value(err)
                    .map_err(|e| AppError::Internal(e.to_string()))?;
                active.last_error = Set(Some(value));
            }
        }

        self.update(active).await
    }

    /// Count active subscriptions grouped by school. Reporting only, never
    /// on the send hot path.
    pub async fn count_active_by_school(&self) -> AppResult<Vec<SchoolSubscriptionCount>> {
        let rows: Vec<(Option<String>, i64)> = Entity::find()
            .select_only()
            .column(Column::SchoolId)
            .column_as(Column::Id.count(), "active_subscriptions")
            .filter(Column::IsActive.eq(true))
            .group_by(Column::SchoolId)
            .into_tuple()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(school_id, active_subscriptions)| SchoolSubscriptionCount {
                school_id,
                active_subscriptions,
            })
            .collect())
    }
}
