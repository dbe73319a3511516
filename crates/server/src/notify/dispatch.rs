//! Fan-out of one notification to every eligible recipient and channel.
//!
//! Every attempt gets its own `notification_log` row: inserted as `pending`, then moved
//! to `sent` or `failed`. Attempts never depend on one another.

use futures::future::join_all;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
    QuerySelect, RelationTrait,
};
use sea_orm::sea_query::JoinType;
use serde::Serialize;
use std::collections::HashSet;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::entity::contact;
use crate::entity::event;
use crate::entity::event_contact;
use crate::entity::notification_log::{
    self, NotificationCategory, NotificationChannel, NotificationStatus,
};
use crate::entity::user_profile;
use crate::error::SendError;
use crate::notify::sender::{OutgoingMessage, SenderRegistry};
use crate::notify::templates::{self, RenderedMessage};

/// Tally of one dispatch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    /// Channels allowed by preference but without a recipient value
    pub skipped: usize,
    /// Distinct contacts with at least one `sent` attempt
    pub contacts_notified: usize,
}

impl DispatchReport {
    pub fn attempts(&self) -> usize {
        self.sent + self.failed
    }
}

/// A delivery that will be attempted and logged.
#[derive(Clone, Debug)]
struct PlannedAttempt {
    contact_id: Option<String>,
    message: OutgoingMessage,
}

#[derive(Clone, Debug)]
struct AttemptOutcome {
    contact_id: Option<String>,
    delivered: bool,
}

/// Associated, non-deleted contacts of `event` that belong to the same owner.
pub async fn resolve_contacts<C: ConnectionTrait>(
    db: &C,
    event: &event::Model,
) -> Result<Vec<contact::Model>, DbErr> {
    contact::Entity::find()
        .join(JoinType::InnerJoin, contact::Relation::EventContacts.def())
        .filter(event_contact::Column::EventId.eq(event.id.as_str()))
        .filter(contact::Column::Deleted.eq(false))
        .filter(contact::Column::OwnerId.eq(event.owner_id.as_str()))
        .all(db)
        .await
}

fn plan_contact_alerts(
    event: &event::Model,
    contacts: &[contact::Model],
) -> (Vec<PlannedAttempt>, usize) {
    let mut planned = Vec::new();
    let mut skipped = 0;
    for c in contacts {
        let rendered = templates::contact_alert(event, &c.name);
        for channel in [NotificationChannel::Email, NotificationChannel::Sms] {
            if !c.notification_preference.allows(channel) {
                continue;
            }
            match c.recipient_for(channel) {
                Some(recipient) => planned.push(PlannedAttempt {
                    contact_id: Some(c.id.clone()),
                    message: OutgoingMessage {
                        channel,
                        recipient: recipient.to_string(),
                        subject: rendered.subject.clone(),
                        body: rendered.body.clone(),
                    },
                }),
                None => skipped += 1,
            }
        }
    }
    (planned, skipped)
}

fn plan_owner_notification(
    profile: &user_profile::Model,
    content: &RenderedMessage,
) -> (Vec<PlannedAttempt>, usize) {
    let mut planned = Vec::new();
    let mut skipped = 0;
    for (channel, value) in [
        (NotificationChannel::Email, profile.email.as_deref()),
        (NotificationChannel::Sms, profile.phone.as_deref()),
        (NotificationChannel::Push, profile.push_token.as_deref()),
    ] {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(recipient) => planned.push(PlannedAttempt {
                contact_id: None,
                message: OutgoingMessage {
                    channel,
                    recipient: recipient.to_string(),
                    subject: content.subject.clone(),
                    body: content.body.clone(),
                },
            }),
            None => skipped += 1,
        }
    }
    (planned, skipped)
}

/// Alert every eligible contact of `event` on every channel their preference allows.
///
/// Only a failure to load the contact list is returned as an error; per-attempt
/// failures are recorded in the log and counted in the report.
#[tracing::instrument(skip(db, senders, event), fields(event_id = %event.id))]
pub async fn dispatch_contact_alerts<C: ConnectionTrait>(
    db: &C,
    senders: &SenderRegistry,
    event: &event::Model,
    now: OffsetDateTime,
) -> Result<DispatchReport, DbErr> {
    let contacts = resolve_contacts(db, event).await?;
    Ok(alert_contacts(db, senders, event, &contacts, now).await)
}

/// Alert already resolved `contacts` of `event`. Never fails.
pub async fn alert_contacts<C: ConnectionTrait>(
    db: &C,
    senders: &SenderRegistry,
    event: &event::Model,
    contacts: &[contact::Model],
    now: OffsetDateTime,
) -> DispatchReport {
    let (planned, skipped) = plan_contact_alerts(event, contacts);
    let mut report = run_attempts(
        db,
        senders,
        &event.id,
        NotificationCategory::ContactAlert,
        planned,
        now,
    )
    .await;
    report.skipped = skipped;

    tracing::info!(
        name = "notify.contact_alerts.dispatched",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        message = "Contact alerts dispatched",
        event_id = %event.id,
        contacts = contacts.len(),
        sent = report.sent,
        failed = report.failed,
        skipped = report.skipped,
    );
    report
}

/// Notify the owner of `event` on every target in their profile.
///
/// An owner without a profile row gets nothing; that is not an error.
#[tracing::instrument(skip(db, senders, event, content), fields(event_id = %event.id))]
pub async fn dispatch_owner_notification<C: ConnectionTrait>(
    db: &C,
    senders: &SenderRegistry,
    event: &event::Model,
    category: NotificationCategory,
    content: &RenderedMessage,
    now: OffsetDateTime,
) -> Result<DispatchReport, DbErr> {
    let Some(profile) = user_profile::Entity::find_by_id(event.owner_id.clone())
        .one(db)
        .await?
    else {
        tracing::debug!(
            name = "notify.owner.no_profile",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            message = "Owner has no profile, skipping owner notification",
            event_id = %event.id,
        );
        return Ok(DispatchReport::default());
    };

    let (planned, skipped) = plan_owner_notification(&profile, content);
    let mut report = run_attempts(db, senders, &event.id, category, planned, now).await;
    report.skipped = skipped;
    report.contacts_notified = 0;
    Ok(report)
}

async fn run_attempts<C: ConnectionTrait>(
    db: &C,
    senders: &SenderRegistry,
    event_id: &str,
    category: NotificationCategory,
    planned: Vec<PlannedAttempt>,
    now: OffsetDateTime,
) -> DispatchReport {
    let outcomes = join_all(
        planned
            .into_iter()
            .map(|p| attempt(db, senders, event_id, category, p, now)),
    )
    .await;

    let mut report = DispatchReport::default();
    let mut reached = HashSet::new();
    for outcome in outcomes {
        if outcome.delivered {
            report.sent += 1;
            if let Some(id) = outcome.contact_id {
                reached.insert(id);
            }
        } else {
            report.failed += 1;
        }
    }
    report.contacts_notified = reached.len();
    report
}

/// One logged delivery. Never fails; the outcome says whether it was delivered.
async fn attempt<C: ConnectionTrait>(
    db: &C,
    senders: &SenderRegistry,
    event_id: &str,
    category: NotificationCategory,
    planned: PlannedAttempt,
    now: OffsetDateTime,
) -> AttemptOutcome {
    let PlannedAttempt {
        contact_id,
        message,
    } = planned;

    let pending = notification_log::ActiveModel {
        id: ActiveValue::NotSet,
        event_id: ActiveValue::Set(event_id.to_string()),
        contact_id: ActiveValue::Set(contact_id.clone()),
        channel: ActiveValue::Set(message.channel),
        recipient: ActiveValue::Set(message.recipient.clone()),
        content: ActiveValue::Set(message.body.clone()),
        category: ActiveValue::Set(category),
        status: ActiveValue::Set(NotificationStatus::Pending),
        error_message: ActiveValue::Set(None),
        sent_at: ActiveValue::Set(None),
        created_at: ActiveValue::Set(now),
    };
    let row = match pending.insert(db).await {
        Ok(row) => row,
        Err(e) => {
            tracing::error!(
                name = "notify.log.insert_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                message = "Could not record pending notification, attempt aborted",
                event_id = %event_id,
                channel = %message.channel,
                error = %e,
            );
            return AttemptOutcome {
                contact_id,
                delivered: false,
            };
        }
    };

    let result = senders.deliver(&message).await;
    let delivered = result.is_ok();

    let mut update: notification_log::ActiveModel = row.into();
    match &result {
        Ok(()) => {
            update.status = ActiveValue::Set(NotificationStatus::Sent);
            update.sent_at = ActiveValue::Set(Some(OffsetDateTime::now_utc().max(now)));
        }
        Err(e) => {
            update.status = ActiveValue::Set(NotificationStatus::Failed);
            update.error_message = ActiveValue::Set(Some(failure_message(e)));
            tracing::warn!(
                name = "notify.attempt.failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                message = "Notification attempt failed",
                event_id = %event_id,
                contact_id = contact_id.as_deref().unwrap_or("owner"),
                channel = %message.channel,
                error = %e,
            );
        }
    }
    if let Err(e) = update.update(db).await {
        tracing::error!(
            name = "notify.log.update_failed",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            message = "Could not record notification outcome",
            event_id = %event_id,
            channel = %message.channel,
            delivered = delivered,
            error = %e,
        );
    }

    AttemptOutcome {
        contact_id,
        delivered,
    }
}

fn failure_message(error: &SendError) -> String {
    let text = error.to_string();
    if text.trim().is_empty() {
        "unknown delivery error".to_string()
    } else {
        text
    }
}
