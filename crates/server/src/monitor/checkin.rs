//! Check-in: the owner resets an event's inactivity timer.

use sea_orm::{ActiveModelTrait, ActiveValue, ConnectionTrait, TransactionTrait};
use time::OffsetDateTime;

use crate::activity::{NewActivity, record_activity};
use crate::domain_events::{DomainEvent, DomainEventBus};
use crate::entity::activity_log::ActivityAction;
use crate::entity::event;
use crate::error::ServiceError;
use crate::monitor::status::{StatusAction, find_owned_event};

/// Reset `last_check_in` and return the event to `running`.
///
/// `owner_id` is an already-authenticated identity. Repeated calls simply reset the
/// timer again. The stored timestamp never moves backwards, even if `now` does.
/// The event update and its activity row commit together; nothing is published
/// unless both are stored.
#[tracing::instrument(skip(db, bus))]
pub async fn check_in<C: ConnectionTrait + TransactionTrait>(
    db: &C,
    bus: &DomainEventBus,
    owner_id: &str,
    event_id: &str,
    now: OffsetDateTime,
) -> Result<event::Model, ServiceError> {
    let txn = db.begin().await?;
    let current = find_owned_event(&txn, owner_id, event_id).await?;
    let next = current.status.apply(StatusAction::CheckIn)?;
    let previous_status = current.status;
    let checked_in_at = now.max(current.last_check_in);

    let mut model: event::ActiveModel = current.into();
    model.last_check_in = ActiveValue::Set(checked_in_at);
    model.status = ActiveValue::Set(next);
    model.updated_at = ActiveValue::Set(now);
    let updated = model.update(&txn).await?;

    record_activity(
        &txn,
        NewActivity::new(ActivityAction::CheckIn)
            .owner(owner_id)
            .event(event_id)
            .detail("timestamp", checked_in_at),
        now,
    )
    .await?;
    txn.commit().await?;

    tracing::info!(
        name = "checkin.performed",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        message = "Owner checked in",
        event_id = %event_id,
        previous_status = previous_status.as_str(),
    );

    bus.publish(DomainEvent::CheckInPerformed {
        owner_id: owner_id.to_string(),
        event_id: event_id.to_string(),
        at: checked_in_at,
    });
    if previous_status != next {
        bus.publish(DomainEvent::EventStatusChanged {
            owner_id: owner_id.to_string(),
            event_id: event_id.to_string(),
            status: next,
        });
    }

    Ok(updated)
}
