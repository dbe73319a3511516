//! Event lifecycle transitions.
//!
//! ```text
//!   running <--pause/resume--> paused
//!   running --trigger--> triggered
//!   running | paused | triggered --check-in--> running
//!   any (not deleted) --delete--> deleted
//! ```

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
    TransactionTrait,
};
use time::OffsetDateTime;

use crate::activity::{NewActivity, record_activity};
use crate::domain_events::{DomainEvent, DomainEventBus};
use crate::entity::activity_log::ActivityAction;
use crate::entity::event::{self, EventStatus};
use crate::error::ServiceError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StatusAction {
    Pause,
    Resume,
    Trigger,
    CheckIn,
    Delete,
}

impl StatusAction {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusAction::Pause => "pause",
            StatusAction::Resume => "resume",
            StatusAction::Trigger => "trigger",
            StatusAction::CheckIn => "check in",
            StatusAction::Delete => "delete",
        }
    }
}

impl EventStatus {
    pub fn apply(self, action: StatusAction) -> Result<EventStatus, ServiceError> {
        use EventStatus::*;
        use StatusAction::*;
        let next = match (self, action) {
            (Running, Pause) => Paused,
            (Paused, Resume) => Running,
            (Running, Trigger) => Triggered,
            (Running | Paused | Triggered, CheckIn) => Running,
            (Running | Paused | Triggered, Delete) => Deleted,
            (from, action) => {
                return Err(ServiceError::InvalidTransition {
                    from: from.as_str(),
                    action: action.as_str(),
                });
            }
        };
        Ok(next)
    }
}

/// Load a live event and check that `owner_id` owns it.
pub async fn find_owned_event<C: ConnectionTrait>(
    db: &C,
    owner_id: &str,
    event_id: &str,
) -> Result<event::Model, ServiceError> {
    let found = event::Entity::find_by_id(event_id.to_string())
        .one(db)
        .await?
        .filter(|e| !e.deleted && e.status != EventStatus::Deleted)
        .ok_or_else(|| ServiceError::NotFound(format!("event {event_id}")))?;
    if found.owner_id != owner_id {
        return Err(ServiceError::Forbidden(format!(
            "event {event_id} belongs to another user"
        )));
    }
    Ok(found)
}

/// Move a running event to `triggered`.
///
/// Single conditional UPDATE: it only matches while the row is still `running`,
/// unmuted and not deleted, so two overlapping check cycles cannot both win.
/// Returns whether this call performed the transition.
#[tracing::instrument(skip(db))]
pub async fn try_trigger<C: ConnectionTrait>(
    db: &C,
    event_id: &str,
    now: OffsetDateTime,
) -> Result<bool, DbErr> {
    let result = event::Entity::update_many()
        .col_expr(event::Column::Status, Expr::value(EventStatus::Triggered))
        .col_expr(event::Column::LastTriggerTime, Expr::value(Some(now)))
        .col_expr(event::Column::UpdatedAt, Expr::value(now))
        .filter(event::Column::Id.eq(event_id))
        .filter(event::Column::Status.eq(EventStatus::Running))
        .filter(event::Column::Deleted.eq(false))
        .filter(event::Column::Muted.eq(false))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Apply a user-initiated pause, resume or delete and record it in one transaction.
#[tracing::instrument(skip(db, bus))]
pub async fn apply_user_action<C: ConnectionTrait + TransactionTrait>(
    db: &C,
    bus: &DomainEventBus,
    owner_id: &str,
    event_id: &str,
    action: StatusAction,
    now: OffsetDateTime,
) -> Result<event::Model, ServiceError> {
    let activity = match action {
        StatusAction::Pause => ActivityAction::PauseEvent,
        StatusAction::Resume => ActivityAction::ResumeEvent,
        StatusAction::Delete => ActivityAction::DeleteEvent,
        StatusAction::Trigger | StatusAction::CheckIn => {
            return Err(ServiceError::Validation(format!(
                "{} is not a user status action",
                action.as_str()
            )));
        }
    };

    let txn = db.begin().await?;
    let current = find_owned_event(&txn, owner_id, event_id).await?;
    let next = current.status.apply(action)?;

    let mut model: event::ActiveModel = current.into();
    model.status = ActiveValue::Set(next);
    model.updated_at = ActiveValue::Set(now);
    if next == EventStatus::Deleted {
        model.deleted = ActiveValue::Set(true);
    }
    let updated = model.update(&txn).await?;

    record_activity(
        &txn,
        NewActivity::new(activity).owner(owner_id).event(event_id),
        now,
    )
    .await?;
    txn.commit().await?;

    tracing::info!(
        name = "status.transition",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        message = "Event status changed by owner",
        event_id = %event_id,
        status = next.as_str(),
    );
    bus.publish(DomainEvent::EventStatusChanged {
        owner_id: owner_id.to_string(),
        event_id: event_id.to_string(),
        status: next,
    });
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use EventStatus::*;
    use StatusAction::*;

    #[test]
    fn allowed_transitions() {
        assert_eq!(Running.apply(Pause).unwrap(), Paused);
        assert_eq!(Paused.apply(Resume).unwrap(), Running);
        assert_eq!(Running.apply(Trigger).unwrap(), Triggered);
        assert_eq!(Triggered.apply(CheckIn).unwrap(), Running);
        assert_eq!(Paused.apply(CheckIn).unwrap(), Running);
        assert_eq!(Running.apply(CheckIn).unwrap(), Running);
        for from in [Running, Paused, Triggered] {
            assert_eq!(from.apply(Delete).unwrap(), Deleted);
        }
    }

    #[test]
    fn rejected_transitions() {
        assert!(Triggered.apply(Trigger).is_err());
        assert!(Paused.apply(Trigger).is_err());
        assert!(Triggered.apply(Pause).is_err());
        assert!(Running.apply(Resume).is_err());
        for action in [Pause, Resume, Trigger, CheckIn, Delete] {
            assert!(Deleted.apply(action).is_err(), "{action:?}");
        }
    }

    #[test]
    fn rejection_names_state_and_action() {
        let err = Triggered.apply(Pause).unwrap_err();
        assert_eq!(err.to_string(), "Cannot pause an event that is triggered");
    }
}
