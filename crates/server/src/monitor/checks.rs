//! Check cycles: the cron-driven inactivity check and operator notify runs.
//!
//! Each event in a cycle is processed independently. A failure while processing one
//! event is logged, reported in its `ProcessedEvent` and does not affect the others.

use futures::StreamExt;
use sea_orm::sea_query::{Condition, Expr};
use sea_orm::{ColumnTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::time::{Duration, MissedTickBehavior};
use utoipa::ToSchema;

use crate::AppResources;
use crate::activity::{NewActivity, record_activity_best_effort};
use crate::domain_events::DomainEvent;
use crate::entity::activity_log::ActivityAction;
use crate::entity::event::{self, EventStatus};
use crate::entity::notification_log::NotificationCategory;
use crate::monitor::overdue::{Evaluation, OverduePolicy};
use crate::monitor::status::try_trigger;
use crate::notify::{
    alert_contacts, dispatch_contact_alerts, dispatch_owner_notification, resolve_contacts,
    templates,
};

/// Input of an operator notify run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NotifyRequest {
    /// Restrict the run to these events; all events when absent
    pub event_ids: Option<Vec<String>>,
    /// Alert contacts regardless of status and timer, without changing status
    pub force: bool,
}

/// Outcome for one event in a cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ProcessedEvent {
    pub id: String,
    pub name: String,
    pub triggered: bool,
    pub forced: bool,
    pub contacts_notified: usize,
    pub reminder_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessedEvent {
    fn for_event(event: &event::Model, forced: bool) -> Self {
        Self {
            id: event.id.clone(),
            name: event.name.clone(),
            forced,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct CheckReport {
    pub evaluated: usize,
    pub triggered: usize,
    pub reminders: usize,
    pub processed: Vec<ProcessedEvent>,
}

impl CheckReport {
    fn from_processed(mut processed: Vec<ProcessedEvent>) -> Self {
        processed.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            evaluated: processed.len(),
            triggered: processed.iter().filter(|p| p.triggered).count(),
            reminders: processed.iter().filter(|p| p.reminder_sent).count(),
            processed,
        }
    }
}

/// Scan every running, unmuted, live event; trigger overdue ones and remind owners
/// whose deadline is close.
#[tracing::instrument(skip(resources))]
pub async fn run_inactivity_check(
    resources: &AppResources,
    now: OffsetDateTime,
) -> Result<CheckReport, DbErr> {
    let events = monitored_events(resources, None).await?;
    let report = process_all(resources, events, false, now).await;
    record_system_check(resources, &report, now).await;
    Ok(report)
}

/// Operator notify run.
///
/// Without `force` this is the inactivity check, optionally restricted to the given
/// events. With `force` the requested non-deleted events alert their contacts whatever
/// their status, mute flag or timer, and keep their status.
#[tracing::instrument(skip(resources))]
pub async fn run_notify(
    resources: &AppResources,
    request: NotifyRequest,
    now: OffsetDateTime,
) -> Result<CheckReport, DbErr> {
    let ids = request.event_ids.filter(|ids| !ids.is_empty());
    if !request.force {
        let events = monitored_events(resources, ids.as_deref()).await?;
        let report = process_all(resources, events, false, now).await;
        record_system_check(resources, &report, now).await;
        return Ok(report);
    }

    let mut query = event::Entity::find()
        .filter(event::Column::Deleted.eq(false))
        .filter(event::Column::Status.ne(EventStatus::Deleted));
    if let Some(ids) = &ids {
        query = query.filter(event::Column::Id.is_in(ids.iter().cloned()));
    }
    let events = query
        .order_by_asc(event::Column::Id)
        .all(resources.db.as_ref())
        .await?;
    Ok(process_all(resources, events, true, now).await)
}

async fn monitored_events(
    resources: &AppResources,
    ids: Option<&[String]>,
) -> Result<Vec<event::Model>, DbErr> {
    let mut query = event::Entity::find()
        .filter(event::Column::Status.eq(EventStatus::Running))
        .filter(event::Column::Deleted.eq(false))
        .filter(event::Column::Muted.eq(false));
    if let Some(ids) = ids {
        query = query.filter(event::Column::Id.is_in(ids.iter().cloned()));
    }
    query
        .order_by_asc(event::Column::Id)
        .all(resources.db.as_ref())
        .await
}

async fn process_all(
    resources: &AppResources,
    events: Vec<event::Model>,
    forced: bool,
    now: OffsetDateTime,
) -> CheckReport {
    let limit = resources.config.scheduler.max_concurrent_events.max(1);
    let processed = futures::stream::iter(events)
        .map(|event| async move {
            let mut outcome = ProcessedEvent::for_event(&event, forced);
            let result = if forced {
                process_forced(resources, &event, &mut outcome, now).await
            } else {
                process_monitored(resources, &event, &mut outcome, now).await
            };
            if let Err(e) = result {
                tracing::error!(
                    name = "checks.event.failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    message = "Processing event failed, continuing with the rest",
                    event_id = %event.id,
                    error = %e,
                );
                outcome.error = Some(e.to_string());
            }
            outcome
        })
        .buffer_unordered(limit)
        .collect::<Vec<_>>()
        .await;
    CheckReport::from_processed(processed)
}

async fn process_monitored(
    resources: &AppResources,
    event: &event::Model,
    outcome: &mut ProcessedEvent,
    now: OffsetDateTime,
) -> Result<(), DbErr> {
    let evaluation = OverduePolicy::for_event(event).evaluate(event.last_check_in, now);

    if evaluation.overdue {
        return trigger(resources, event, outcome, now).await;
    }

    let reminders = &resources.config.reminders;
    if reminders.enabled
        && evaluation.in_reminder_window(reminders.lead_ratio)
        && !event.reminder_sent_this_episode()
    {
        outcome.reminder_sent = remind_owner(resources, event, &evaluation, now).await?;
    }
    Ok(())
}

/// Contacts are resolved before the status flips, so a datastore error leaves the
/// event `running` and the next cycle retries it. Nothing after `try_trigger` fails.
async fn trigger(
    resources: &AppResources,
    event: &event::Model,
    outcome: &mut ProcessedEvent,
    now: OffsetDateTime,
) -> Result<(), DbErr> {
    let db = resources.db.as_ref();
    let contacts = resolve_contacts(db, event).await?;
    if !try_trigger(db, &event.id, now).await? {
        tracing::info!(
            name = "checks.event.trigger_lost",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            message = "Event no longer running, another cycle handled it",
            event_id = %event.id,
        );
        return Ok(());
    }
    outcome.triggered = true;

    let report = alert_contacts(db, &resources.senders, event, &contacts, now).await;
    outcome.contacts_notified = report.contacts_notified;

    let owner_message = templates::owner_trigger(event, report.contacts_notified);
    if let Err(e) = dispatch_owner_notification(
        db,
        &resources.senders,
        event,
        NotificationCategory::EventTrigger,
        &owner_message,
        now,
    )
    .await
    {
        tracing::error!(
            name = "checks.owner_trigger.failed",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            message = "Could not notify owner about the trigger",
            event_id = %event.id,
            error = %e,
        );
    }

    record_activity_best_effort(
        db,
        NewActivity::new(ActivityAction::EventTriggered)
            .owner(&event.owner_id)
            .event(&event.id)
            .detail("contacts_notified", report.contacts_notified),
        now,
    )
    .await;

    tracing::info!(
        name = "checks.event.triggered",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        message = "Event triggered, contacts alerted",
        event_id = %event.id,
        contacts_notified = report.contacts_notified,
        failed = report.failed,
    );
    resources.bus.publish(DomainEvent::EventTriggered {
        owner_id: event.owner_id.clone(),
        event_id: event.id.clone(),
        contacts_notified: report.contacts_notified,
    });
    Ok(())
}

/// Claim the reminder for this episode, then send it.
///
/// The claim is a conditional UPDATE so overlapping cycles send at most one reminder.
async fn remind_owner(
    resources: &AppResources,
    event: &event::Model,
    evaluation: &Evaluation,
    now: OffsetDateTime,
) -> Result<bool, DbErr> {
    let db = resources.db.as_ref();
    let claimed = event::Entity::update_many()
        .col_expr(event::Column::LastReminderAt, Expr::value(Some(now)))
        .filter(event::Column::Id.eq(event.id.as_str()))
        .filter(event::Column::Status.eq(EventStatus::Running))
        .filter(
            Condition::any()
                .add(event::Column::LastReminderAt.is_null())
                .add(
                    Expr::col(event::Column::LastReminderAt)
                        .lt(Expr::col(event::Column::LastCheckIn)),
                ),
        )
        .exec(db)
        .await?;
    if claimed.rows_affected != 1 {
        return Ok(false);
    }

    let content = templates::owner_reminder(event, evaluation);
    let report = dispatch_owner_notification(
        db,
        &resources.senders,
        event,
        NotificationCategory::UserReminder,
        &content,
        now,
    )
    .await?;

    tracing::info!(
        name = "checks.event.reminded",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        message = "Owner reminded of approaching deadline",
        event_id = %event.id,
        sent = report.sent,
        failed = report.failed,
    );
    Ok(report.sent > 0)
}

async fn process_forced(
    resources: &AppResources,
    event: &event::Model,
    outcome: &mut ProcessedEvent,
    now: OffsetDateTime,
) -> Result<(), DbErr> {
    let db = resources.db.as_ref();
    let report = dispatch_contact_alerts(db, &resources.senders, event, now).await?;
    outcome.contacts_notified = report.contacts_notified;

    record_activity_best_effort(
        db,
        NewActivity::new(ActivityAction::ManualNotify)
            .owner(&event.owner_id)
            .event(&event.id)
            .detail("contacts_notified", report.contacts_notified)
            .detail("forced", true),
        now,
    )
    .await;

    tracing::info!(
        name = "checks.event.forced",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        message = "Forced notification sent, status unchanged",
        event_id = %event.id,
        status = event.status.as_str(),
        contacts_notified = report.contacts_notified,
    );
    Ok(())
}

async fn record_system_check(resources: &AppResources, report: &CheckReport, now: OffsetDateTime) {
    record_activity_best_effort(
        resources.db.as_ref(),
        NewActivity::new(ActivityAction::SystemCheck)
            .detail("evaluated", report.evaluated)
            .detail("triggered", report.triggered)
            .detail("reminders", report.reminders),
        now,
    )
    .await;

    tracing::info!(
        name = "checks.cycle.completed",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        message = "Inactivity check completed",
        evaluated = report.evaluated,
        triggered = report.triggered,
        reminders = report.reminders,
    );
}

/// In-process stand-in for the external cron: run the inactivity check every
/// `scheduler.interval_secs` until the process exits.
#[tracing::instrument(skip_all)]
pub async fn scheduled_check_loop(resources: AppResources) {
    let period = Duration::from_secs(resources.config.scheduler.interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if let Err(e) = run_inactivity_check(&resources, OffsetDateTime::now_utc()).await {
            tracing::error!(
                name = "checks.cycle.failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                message = "Scheduled inactivity check failed",
                error = %e,
            );
        }
    }
}
