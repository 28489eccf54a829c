//! Push subscription entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::notification::NotificationCategory;

/// Client platform flags reported by the browser at registration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlatformInfo {
    #[serde(rename = "isIOS")]
    pub is_ios: bool,
    pub is_android: bool,
    pub is_windows: bool,
    pub is_safari: bool,
    pub is_chrome: bool,
    pub is_firefox: bool,
    #[serde(rename = "isPWA")]
    pub is_pwa: bool,
    /// Free-text browser name
    pub browser_name: Option<String>,
    /// Free-text OS name
    pub os_name: Option<String>,
}

/// Per-category delivery toggles. All categories default to enabled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationPreferences {
    pub grades: bool,
    pub assignments: bool,
    pub announcements: bool,
    pub events: bool,
    pub urgent: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            grades: true,
            assignments: true,
            announcements: true,
            events: true,
            urgent: true,
        }
    }
}

impl NotificationPreferences {
    /// Whether deliveries of the given category are enabled.
    #[must_use]
    pub const fn enables(&self, category: NotificationCategory) -> bool {
        match category {
            NotificationCategory::Grade => self.grades,
            NotificationCategory::Assignment => self.assignments,
            NotificationCategory::Announcement => self.announcements,
            NotificationCategory::Event => self.events,
            NotificationCategory::Urgent => self.urgent,
        }
    }
}

/// Last transport error recorded for a subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastError {
    pub message: String,
    pub status_code: Option<u16>,
    pub at: chrono::DateTime<chrono::FixedOffset>,
}

/// Push subscription entity: one browser/device registration for one user.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "push_subscription")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Owning user
    #[sea_orm(indexed)]
    pub user_id: String,

    /// Tenant scope. NULL for super-admin-scoped users.
    #[sea_orm(nullable)]
    pub school_id: Option<String>,

    /// Push service URL. Globally unique: one row per browser registration.
    #[sea_orm(column_type = "Text", unique)]
    pub endpoint: String,

    /// P256DH encryption key supplied by the browser push API
    pub p256dh: String,

    /// Auth encryption key supplied by the browser push API
    pub auth: String,

    /// Browser-supplied expiration hint
    #[sea_orm(nullable)]
    pub expiration_time: Option<DateTimeWithTimeZone>,

    /// User agent of the device
    #[sea_orm(nullable)]
    pub user_agent: Option<String>,

    /// Platform flags (JSON `PlatformInfo`)
    #[sea_orm(column_type = "JsonBinary")]
    pub platform: Json,

    /// Per-category delivery toggles (JSON `NotificationPreferences`)
    #[sea_orm(column_type = "JsonBinary")]
    pub preferences: Json,

    /// Inactive rows are excluded from send targeting but kept for audit
    #[sea_orm(default_value = true)]
    pub is_active: bool,

    /// Total send attempts
    #[sea_orm(default_value = 0)]
    pub total_pushes: i32,

    /// Successful sends
    #[sea_orm(default_value = 0)]
    pub successful_pushes: i32,

    /// Failed sends (including expiry rejections)
    #[sea_orm(default_value = 0)]
    pub failed_pushes: i32,

    /// Last send attempt timestamp
    #[sea_orm(nullable)]
    pub last_push_sent_at: Option<DateTimeWithTimeZone>,

    /// Last successful send timestamp
    #[sea_orm(nullable)]
    pub last_push_success_at: Option<DateTimeWithTimeZone>,

    /// Last transport error (JSON `LastError`)
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub last_error: Option<Json>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,

    /// Last time the subscription was touched by a register call
    #[sea_orm(nullable)]
    pub last_used_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Decode the stored platform flags. Unknown or missing fields fall
    /// back to defaults rather than failing the whole row.
    #[must_use]
    pub fn platform_info(&self) -> PlatformInfo {
        serde_json::from_value(self.platform.clone()).unwrap_or_default()
    }

    /// Decode the stored delivery preferences.
    #[must_use]
    pub fn notification_preferences(&self) -> NotificationPreferences {
        serde_json::from_value(self.preferences.clone()).unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_default_all_enabled() {
        let prefs = NotificationPreferences::default();
        assert!(prefs.enables(NotificationCategory::Grade));
        assert!(prefs.enables(NotificationCategory::Assignment));
        assert!(prefs.enables(NotificationCategory::Announcement));
        assert!(prefs.enables(NotificationCategory::Event));
        assert!(prefs.enables(NotificationCategory::Urgent));
    }

    #[test]
    fn test_preferences_disable_one_category() {
        let prefs = NotificationPreferences {
            grades: false,
            ..NotificationPreferences::default()
        };
        assert!(!prefs.enables(NotificationCategory::Grade));
        assert!(prefs.enables(NotificationCategory::Urgent));
    }

    #[test]
    fn test_platform_info_decodes_partial_json() {
        let value = serde_json::json!({ "isIOS": true, "browserName": "Safari" });
        let info: PlatformInfo = serde_json::from_value(value).unwrap();
        assert!(info.is_ios);
        assert!(!info.is_android);
        assert_eq!(info.browser_name.as_deref(), Some("Safari"));
    }
}
