//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test --test db_integration -- --ignored`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `gradebook_test`)
//!   `TEST_DB_PASSWORD` (default: `gradebook_test`)
//!   `TEST_DB_NAME` (default: `gradebook_test`)

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use gradebook_common::AppError;
use gradebook_db::entities::push_subscription::{NotificationPreferences, PlatformInfo};
use gradebook_db::entities::user::UserRole;
use gradebook_db::entities::{push_subscription, user};
use gradebook_db::repositories::{PushSubscriptionRepository, UserRepository};
use gradebook_db::test_utils::{TestDatabase, TestDbConfig};
use sea_orm::Set;

fn user_model(id: &str) -> user::ActiveModel {
    user::ActiveModel {
        id: Set(id.to_string()),
        username: Set(format!("user_{id}")),
        email: Set(None),
        name: Set(Some("Test User".to_string())),
        role: Set(UserRole::Student),
        school_id: Set(Some("school1".to_string())),
        token: Set(Some(format!("token_{id}"))),
        is_active: Set(true),
        created_at: Set(Utc::now().into()),
        updated_at: Set(None),
    }
}

fn subscription_model(id: &str, user_id: &str, endpoint: &str) -> push_subscription::ActiveModel {
    push_subscription::ActiveModel {
        id: Set(id.to_string()),
        user_id: Set(user_id.to_string()),
        school_id: Set(Some("school1".to_string())),
        endpoint: Set(endpoint.to_string()),
        p256dh: Set("p256dh-key".to_string()),
        auth: Set("auth-key".to_string()),
        expiration_time: Set(None),
        user_agent: Set(None),
        platform: Set(serde_json::to_value(PlatformInfo::default()).unwrap()),
        preferences: Set(serde_json::to_value(NotificationPreferences::default()).unwrap()),
        is_active: Set(true),
        total_pushes: Set(0),
        successful_pushes: Set(0),
        failed_pushes: Set(0),
        last_push_sent_at: Set(None),
        last_push_success_at: Set(None),
        last_error: Set(None),
        created_at: Set(Utc::now().into()),
        updated_at: Set(None),
        last_used_at: Set(None),
    }
}

async fn setup() -> (TestDatabase, UserRepository, PushSubscriptionRepository) {
    let db = TestDatabase::create_unique()
        .await
        .expect("Failed to create test database");
    gradebook_db::migrate(db.connection())
        .await
        .expect("Failed to run migrations");

    let conn = Arc::clone(&db.conn);
    let users = UserRepository::new(Arc::clone(&conn));
    let subs = PushSubscriptionRepository::new(conn);
    (db, users, subs)
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_database_connection() {
    let config = TestDbConfig::default();
    let result = TestDatabase::with_config(config).await;
    assert!(result.is_ok(), "Failed to connect: {:?}", result.err());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_endpoint_unique_index_rejects_second_insert() {
    let (db, users, subs) = setup().await;

    users.create(user_model("u1")).await.unwrap();
    subs.create(subscription_model("s1", "u1", "https://push.example/ep1"))
        .await
        .unwrap();

    // Second insert for the same endpoint must come back as a friendly
    // conflict, not a raw database error.
    let result = subs
        .create(subscription_model("s2", "u1", "https://push.example/ep1"))
        .await;
    match result {
        Err(AppError::Conflict(_)) => {}
        other => panic!("Expected Conflict, got {other:?}"),
    }

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_deactivate_expired_is_idempotent() {
    let (db, users, subs) = setup().await;

    users.create(user_model("u1")).await.unwrap();

    let mut expired = subscription_model("s1", "u1", "https://push.example/ep1");
    expired.expiration_time = Set(Some((Utc::now() - Duration::hours(1)).into()));
    subs.create(expired).await.unwrap();

    let mut live = subscription_model("s2", "u1", "https://push.example/ep2");
    live.expiration_time = Set(Some((Utc::now() + Duration::hours(1)).into()));
    subs.create(live).await.unwrap();

    let first = subs.deactivate_expired().await.unwrap();
    assert_eq!(first, 1);

    // Nothing new expired between calls, so the second pass is a no-op.
    let second = subs.deactivate_expired().await.unwrap();
    assert_eq!(second, 0);

    let active = subs.find_active_by_user("u1").await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].endpoint, "https://push.example/ep2");

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_deactivate_by_endpoints() {
    let (db, users, subs) = setup().await;

    users.create(user_model("u1")).await.unwrap();
    subs.create(subscription_model("s1", "u1", "https://push.example/ep1"))
        .await
        .unwrap();
    subs.create(subscription_model("s2", "u1", "https://push.example/ep2"))
        .await
        .unwrap();

    let count = subs
        .deactivate_by_endpoints(&["https://push.example/ep1".to_string()])
        .await
        .unwrap();
    assert_eq!(count, 1);

    let active = subs.find_active_by_user("u1").await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].endpoint, "https://push.example/ep2");

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_delete_by_user_and_endpoint_missing_row() {
    let (db, users, subs) = setup().await;

    users.create(user_model("u1")).await.unwrap();

    let deleted = subs
        .delete_by_user_and_endpoint("u1", "https://push.example/missing")
        .await
        .unwrap();
    assert_eq!(deleted, 0);

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_record_attempt_updates_telemetry() {
    let (db, users, subs) = setup().await;

    users.create(user_model("u1")).await.unwrap();
    subs.create(subscription_model("s1", "u1", "https://push.example/ep1"))
        .await
        .unwrap();

    let updated = subs.record_attempt("s1", true, None).await.unwrap();
    assert_eq!(updated.total_pushes, 1);
    assert_eq!(updated.successful_pushes, 1);
    assert_eq!(updated.failed_pushes, 0);
    assert!(updated.last_push_success_at.is_some());

    let error = gradebook_db::entities::push_subscription::LastError {
        message: "server error".to_string(),
        status_code: Some(500),
        at: Utc::now().into(),
    };
    let updated = subs.record_attempt("s1", false, Some(&error)).await.unwrap();
    assert_eq!(updated.total_pushes, 2);
    assert_eq!(updated.failed_pushes, 1);
    assert!(updated.last_error.is_some());

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_count_active_by_school() {
    let (db, users, subs) = setup().await;

    users.create(user_model("u1")).await.unwrap();
    subs.create(subscription_model("s1", "u1", "https://push.example/ep1"))
        .await
        .unwrap();
    subs.create(subscription_model("s2", "u1", "https://push.example/ep2"))
        .await
        .unwrap();

    let counts = subs.count_active_by_school().await.unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].school_id.as_deref(), Some("school1"));
    assert_eq!(counts[0].active_subscriptions, 2);

    db.drop_database().await.unwrap();
}

#[test]
fn test_config_from_env() {
    // Test that default config is valid
    let config = TestDbConfig::default();
    assert!(!config.host.is_empty());
    assert!(config.port > 0);
    assert!(!config.username.is_empty());
    assert!(!config.database.is_empty());
}

#[test]
fn test_database_url_format() {
    let config = TestDbConfig {
        host: "testhost".to_string(),
        port: 5432,
        username: "testuser".to_string(),
        password: "testpass".to_string(),
        database: "testdb".to_string(),
    };

    let url = config.database_url();
    assert!(url.starts_with("postgres://"));
    assert!(url.contains("testhost"));
    assert!(url.contains("5432"));
    assert!(url.contains("testuser"));
    assert!(url.contains("testdb"));
}
