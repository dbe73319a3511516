use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

use super::notification_log::NotificationChannel;

/// Which channels a contact wants to be alerted on.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum ContactPreference {
    #[sea_orm(string_value = "email")]
    Email,
    #[sea_orm(string_value = "sms")]
    Sms,
    #[sea_orm(string_value = "both")]
    Both,
}

impl ContactPreference {
    pub fn allows(self, channel: NotificationChannel) -> bool {
        matches!(
            (self, channel),
            (ContactPreference::Email, NotificationChannel::Email)
                | (ContactPreference::Sms, NotificationChannel::Sms)
                | (ContactPreference::Both, NotificationChannel::Email)
                | (ContactPreference::Both, NotificationChannel::Sms)
        )
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, ToSchema)]
#[sea_orm(table_name = "contact")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notification_preference: ContactPreference,
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
    /// Non-empty recipient address for `channel`, if the contact has one.
    pub fn recipient_for(&self, channel: NotificationChannel) -> Option<&str> {
        let value = match channel {
            NotificationChannel::Email => self.email.as_deref(),
            NotificationChannel::Sms => self.phone.as_deref(),
            NotificationChannel::Push => None,
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }
}
