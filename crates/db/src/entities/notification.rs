//! Notification entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Notification categories.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "camelCase")]
pub enum NotificationCategory {
    #[sea_orm(string_value = "grade")]
    Grade,
    #[sea_orm(string_value = "assignment")]
    Assignment,
    #[sea_orm(string_value = "announcement")]
    Announcement,
    #[sea_orm(string_value = "event")]
    Event,
    #[sea_orm(string_value = "urgent")]
    Urgent,
}

impl std::fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Grade => "grade",
            Self::Assignment => "assignment",
            Self::Announcement => "announcement",
            Self::Event => "event",
            Self::Urgent => "urgent",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// The user receiving the notification
    pub user_id: String,

    /// Tenant scope
    #[sea_orm(nullable)]
    pub school_id: Option<String>,

    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub body: String,

    /// Notification category
    pub category: NotificationCategory,

    /// Click-through URL
    #[sea_orm(nullable)]
    pub url: Option<String>,

    /// Has this notification been read?
    #[sea_orm(default_value = false)]
    pub is_read: bool,

    pub created_at: DateTimeWithTimeZone,
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
