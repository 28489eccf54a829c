//! Create push_subscription table for Web Push notifications.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PushSubscription::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PushSubscription::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PushSubscription::UserId).string().not_null())
                    .col(ColumnDef::new(PushSubscription::SchoolId).string().null())
                    .col(ColumnDef::new(PushSubscription::Endpoint).text().not_null())
                    .col(ColumnDef::new(PushSubscription::P256dh).string().not_null())
                    .col(ColumnDef::new(PushSubscription::Auth).string().not_null())
                    .col(
                        ColumnDef::new(PushSubscription::ExpirationTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(PushSubscription::UserAgent).string().null())
                    .col(
                        ColumnDef::new(PushSubscription::Platform)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PushSubscription::Preferences)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PushSubscription::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(PushSubscription::TotalPushes)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PushSubscription::SuccessfulPushes)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PushSubscription::FailedPushes)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PushSubscription::LastPushSentAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PushSubscription::LastPushSuccessAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PushSubscription::LastError)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PushSubscription::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PushSubscription::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PushSubscription::LastUsedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_push_subscription_user")
                            .from(PushSubscription::Table, PushSubscription::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index on user_id for listing a user's subscriptions
        manager
            .create_index(
                Index::create()
                    .name("idx_push_subscription_user_id")
                    .table(PushSubscription::Table)
                    .col(PushSubscription::UserId)
                    .to_owned(),
            )
            .await?;

        // Unique index on endpoint: one row per browser registration
        manager
            .create_index(
                Index::create()
                    .name("idx_push_subscription_endpoint")
                    .table(PushSubscription::Table)
                    .col(PushSubscription::Endpoint)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index on is_active for send targeting and cleanup
        manager
            .create_index(
                Index::create()
                    .name("idx_push_subscription_is_active")
                    .table(PushSubscription::Table)
                    .col(PushSubscription::IsActive)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PushSubscription::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(Iden)]
enum PushSubscription {
    Table,
    Id,
    UserId,
    SchoolId,
    Endpoint,
    P256dh,
    Auth,
    ExpirationTime,
    UserAgent,
    Platform,
    Preferences,
    IsActive,
    TotalPushes,
    SuccessfulPushes,
    FailedPushes,
    LastPushSentAt,
    LastPushSuccessAt,
    LastError,
    CreatedAt,
    UpdatedAt,
    LastUsedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
