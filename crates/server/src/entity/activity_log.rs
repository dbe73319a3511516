//! Append-only audit trail of user and system actions.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use utoipa::ToSchema;

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    #[sea_orm(string_value = "check_in")]
    CheckIn,
    #[sea_orm(string_value = "create_event")]
    CreateEvent,
    #[sea_orm(string_value = "update_event")]
    UpdateEvent,
    #[sea_orm(string_value = "delete_event")]
    DeleteEvent,
    #[sea_orm(string_value = "pause_event")]
    PauseEvent,
    #[sea_orm(string_value = "resume_event")]
    ResumeEvent,
    #[sea_orm(string_value = "create_contact")]
    CreateContact,
    #[sea_orm(string_value = "delete_contact")]
    DeleteContact,
    #[sea_orm(string_value = "event_triggered")]
    EventTriggered,
    #[sea_orm(string_value = "manual_notify")]
    ManualNotify,
    #[sea_orm(string_value = "system_check")]
    SystemCheck,
    #[sea_orm(string_value = "test_notification")]
    TestNotification,
    #[sea_orm(string_value = "update_profile")]
    UpdateProfile,
}

/// Typed key/value payload stored in `activity_log.details` as JSON text.
///
/// Known keys per action:
/// - `check_in`: `timestamp`
/// - `event_triggered`: `contacts_notified`
/// - `manual_notify`: `contacts_notified`, `forced`
/// - `system_check`: `evaluated`, `triggered`, `reminders`
/// - `update_event`: one key per changed field, value `"changed"`
/// - `test_notification`: `channels`
/// - `update_profile`: one key per changed field, value `"changed"`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityDetails(BTreeMap<String, String>);

impl ActivityDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        serde_json::to_string(&self.0).ok()
    }

    /// Malformed rows decode as empty rather than failing the read.
    pub fn from_json(raw: Option<&str>) -> Self {
        raw.and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, ToSchema)]
#[sea_orm(table_name = "activity_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Empty for system actions such as scheduled checks
    pub owner_id: Option<String>,
    pub event_id: Option<String>,
    pub contact_id: Option<String>,
    pub action: ActivityAction,
    pub details: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn details(&self) -> ActivityDetails {
        ActivityDetails::from_json(self.details.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_round_trip_through_json() {
        let details = ActivityDetails::new()
            .with("contacts_notified", 2)
            .with("forced", true);
        let json = details.to_json().unwrap();
        assert_eq!(json, r#"{"contacts_notified":"2","forced":"true"}"#);
        assert_eq!(ActivityDetails::from_json(Some(&json)), details);
    }

    #[test]
    fn empty_details_store_null() {
        assert_eq!(ActivityDetails::new().to_json(), None);
        assert!(ActivityDetails::from_json(None).is_empty());
        assert!(ActivityDetails::from_json(Some("not json")).is_empty());
    }
}
