//! Writing the append-only activity trail.

use crate::entity::activity_log::{self, ActivityAction, ActivityDetails};
use sea_orm::{ActiveModelTrait, ActiveValue, ConnectionTrait, DbErr};
use time::OffsetDateTime;

/// An activity row about to be written.
#[derive(Clone, Debug)]
pub struct NewActivity {
    pub action: ActivityAction,
    pub owner_id: Option<String>,
    pub event_id: Option<String>,
    pub contact_id: Option<String>,
    pub details: ActivityDetails,
}

impl NewActivity {
    pub fn new(action: ActivityAction) -> Self {
        Self {
            action,
            owner_id: None,
            event_id: None,
            contact_id: None,
            details: ActivityDetails::new(),
        }
    }

    pub fn owner(mut self, owner_id: &str) -> Self {
        self.owner_id = Some(owner_id.to_string());
        self
    }

    pub fn event(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }

    pub fn contact(mut self, contact_id: &str) -> Self {
        self.contact_id = Some(contact_id.to_string());
        self
    }

    pub fn detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details = self.details.with(key, value);
        self
    }
}

#[tracing::instrument(skip(db, entry), fields(action = ?entry.action))]
pub async fn record_activity<C: ConnectionTrait>(
    db: &C,
    entry: NewActivity,
    now: OffsetDateTime,
) -> Result<activity_log::Model, DbErr> {
    activity_log::ActiveModel {
        id: ActiveValue::NotSet,
        owner_id: ActiveValue::Set(entry.owner_id),
        event_id: ActiveValue::Set(entry.event_id),
        contact_id: ActiveValue::Set(entry.contact_id),
        action: ActiveValue::Set(entry.action),
        details: ActiveValue::Set(entry.details.to_json()),
        created_at: ActiveValue::Set(now),
    }
    .insert(db)
    .await
}

/// Like [`record_activity`] but only logs on failure; for paths where the audit row
/// must not abort work that already happened.
pub async fn record_activity_best_effort<C: ConnectionTrait>(
    db: &C,
    entry: NewActivity,
    now: OffsetDateTime,
) {
    let action = entry.action;
    if let Err(e) = record_activity(db, entry, now).await {
        tracing::error!(
            name = "activity.record.failed",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            error = %e,
            action = ?action,
            message = "Failed to write activity log entry"
        );
    }
}
