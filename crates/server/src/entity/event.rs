use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Lifecycle state of a check-in event.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "triggered")]
    Triggered,
    #[sea_orm(string_value = "paused")]
    Paused,
    #[sea_orm(string_value = "deleted")]
    Deleted,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Running => "running",
            EventStatus::Triggered => "triggered",
            EventStatus::Paused => "paused",
            EventStatus::Deleted => "deleted",
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, ToSchema)]
#[sea_orm(table_name = "event")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub memo: Option<String>,
    /// Interval string such as "1 day"
    pub check_in_frequency: String,
    pub missed_checkin_threshold: i32,
    pub last_check_in: OffsetDateTime,
    pub status: EventStatus,
    pub last_trigger_time: Option<OffsetDateTime>,
    /// Owner reminder sent during the current overdue episode, if any
    pub last_reminder_at: Option<OffsetDateTime>,
    pub muted: bool,
    pub notification_content: Option<String>,
    pub deleted: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::event_contact::Entity")]
    EventContacts,
}

impl Related<super::event_contact::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EventContacts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the reminder for the current episode has already gone out.
    pub fn reminder_sent_this_episode(&self) -> bool {
        self.last_reminder_at
            .is_some_and(|sent| sent >= self.last_check_in)
    }
}
