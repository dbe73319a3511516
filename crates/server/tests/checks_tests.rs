//! Inactivity check and notify runs against an in-memory database with recording senders.

mod common;

use common::{RecordingSender, TestEnv, insert_contact, insert_event, insert_profile, link};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use stay_connected::entity::activity_log::{self, ActivityAction};
use stay_connected::entity::contact::ContactPreference;
use stay_connected::entity::event::{self, EventStatus};
use stay_connected::entity::notification_log::{
    self, NotificationCategory, NotificationChannel, NotificationStatus,
};
use stay_connected::monitor::status::try_trigger;
use stay_connected::monitor::{NotifyRequest, run_inactivity_check, run_notify};
use time::Duration;

async fn reload(env: &TestEnv, id: &str) -> event::Model {
    event::Entity::find_by_id(id.to_string())
        .one(env.db())
        .await
        .unwrap()
        .expect("event exists")
}

async fn logs_for(env: &TestEnv, event_id: &str) -> Vec<notification_log::Model> {
    notification_log::Entity::find()
        .filter(notification_log::Column::EventId.eq(event_id))
        .all(env.db())
        .await
        .unwrap()
}

async fn activities(env: &TestEnv, action: ActivityAction) -> Vec<activity_log::Model> {
    activity_log::Entity::find()
        .filter(activity_log::Column::Action.eq(action))
        .all(env.db())
        .await
        .unwrap()
}

#[tokio::test]
async fn overdue_event_triggers_once_and_alerts_contacts() {
    let env = TestEnv::new().await;
    let now = common::now();
    insert_event(env.db(), "ev1", "alice", "1 day", now - Duration::hours(30), EventStatus::Running).await;
    insert_contact(env.db(), "c1", "alice", Some("bob@example.com"), None, ContactPreference::Email).await;
    link(env.db(), "ev1", "c1").await;

    let report = run_inactivity_check(&env.resources, now).await.unwrap();
    assert_eq!(report.triggered, 1);
    assert_eq!(report.processed.len(), 1);
    assert!(report.processed[0].triggered);
    assert_eq!(report.processed[0].contacts_notified, 1);
    assert_eq!(env.email.recipients(), ["bob@example.com"]);

    let stored = reload(&env, "ev1").await;
    assert_eq!(stored.status, EventStatus::Triggered);
    assert_eq!(stored.last_trigger_time, Some(now));

    // A second cycle no longer sees the event as running.
    let again = run_inactivity_check(&env.resources, now + Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(again.triggered, 0);
    assert!(again.processed.is_empty());
    assert_eq!(env.email.count(), 1);
    assert_eq!(activities(&env, ActivityAction::EventTriggered).await.len(), 1);
}

#[tokio::test]
async fn only_one_trigger_wins() {
    let env = TestEnv::new().await;
    let now = common::now();
    insert_event(env.db(), "ev1", "alice", "1 hour", now - Duration::hours(3), EventStatus::Running).await;

    assert!(try_trigger(env.db(), "ev1", now).await.unwrap());
    assert!(!try_trigger(env.db(), "ev1", now).await.unwrap());
}

#[tokio::test]
async fn one_failing_channel_does_not_block_the_others() {
    let env = TestEnv::with_senders(
        RecordingSender::new(NotificationChannel::Email),
        RecordingSender::failing_for(NotificationChannel::Sms, &["+15550001111"]),
    )
    .await;
    let now = common::now();
    insert_event(env.db(), "ev1", "alice", "12 hours", now - Duration::hours(13), EventStatus::Running).await;
    insert_contact(env.db(), "a", "alice", Some("a@example.com"), None, ContactPreference::Email).await;
    insert_contact(env.db(), "b", "alice", None, Some("+15550001111"), ContactPreference::Sms).await;
    link(env.db(), "ev1", "a").await;
    link(env.db(), "ev1", "b").await;

    let report = run_inactivity_check(&env.resources, now).await.unwrap();
    assert_eq!(report.processed[0].contacts_notified, 1);
    assert!(report.processed[0].error.is_none());

    let logs = logs_for(&env, "ev1").await;
    assert_eq!(logs.len(), 2);
    let email = logs
        .iter()
        .find(|l| l.channel == NotificationChannel::Email)
        .unwrap();
    assert_eq!(email.status, NotificationStatus::Sent);
    assert_eq!(email.category, NotificationCategory::ContactAlert);
    assert!(email.sent_at.is_some());
    let sms = logs
        .iter()
        .find(|l| l.channel == NotificationChannel::Sms)
        .unwrap();
    assert_eq!(sms.status, NotificationStatus::Failed);
    assert_eq!(sms.contact_id.as_deref(), Some("b"));
    assert!(sms.error_message.as_deref().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn deleted_and_foreign_contacts_are_not_alerted() {
    let env = TestEnv::new().await;
    let now = common::now();
    insert_event(env.db(), "ev1", "alice", "1 day", now - Duration::days(2), EventStatus::Running).await;
    insert_contact(env.db(), "live", "alice", Some("live@example.com"), None, ContactPreference::Email).await;
    let gone = insert_contact(env.db(), "gone", "alice", Some("gone@example.com"), None, ContactPreference::Email).await;
    insert_contact(env.db(), "other", "mallory", Some("other@example.com"), None, ContactPreference::Email).await;
    for c in ["live", "gone", "other"] {
        link(env.db(), "ev1", c).await;
    }
    let mut gone: stay_connected::entity::contact::ActiveModel = gone.into();
    gone.deleted = Set(true);
    gone.update(env.db()).await.unwrap();

    run_inactivity_check(&env.resources, now).await.unwrap();
    assert_eq!(env.email.recipients(), ["live@example.com"]);
}

#[tokio::test]
async fn muted_paused_and_deleted_events_are_skipped() {
    let env = TestEnv::new().await;
    let now = common::now();
    let long_ago = now - Duration::days(10);
    let muted = insert_event(env.db(), "muted", "alice", "1 day", long_ago, EventStatus::Running).await;
    let mut muted: event::ActiveModel = muted.into();
    muted.muted = Set(true);
    muted.update(env.db()).await.unwrap();
    insert_event(env.db(), "paused", "alice", "1 day", long_ago, EventStatus::Paused).await;
    insert_event(env.db(), "deleted", "alice", "1 day", long_ago, EventStatus::Deleted).await;

    let report = run_inactivity_check(&env.resources, now).await.unwrap();
    assert_eq!(report.evaluated, 0);
    assert_eq!(reload(&env, "muted").await.status, EventStatus::Running);
    assert_eq!(reload(&env, "paused").await.status, EventStatus::Paused);
}

#[tokio::test]
async fn event_within_window_is_left_alone() {
    let env = TestEnv::new().await;
    let now = common::now();
    insert_event(env.db(), "ev1", "alice", "1 day", now - Duration::hours(2), EventStatus::Running).await;

    let report = run_inactivity_check(&env.resources, now).await.unwrap();
    assert_eq!(report.evaluated, 1);
    assert!(!report.processed[0].triggered);
    assert!(!report.processed[0].reminder_sent);
    assert_eq!(reload(&env, "ev1").await.status, EventStatus::Running);
}

#[tokio::test]
async fn threshold_multiplies_the_window() {
    let env = TestEnv::new().await;
    let now = common::now();
    let ev = insert_event(env.db(), "ev1", "alice", "1 day", now - Duration::hours(30), EventStatus::Running).await;
    let mut ev: event::ActiveModel = ev.into();
    ev.missed_checkin_threshold = Set(2);
    ev.update(env.db()).await.unwrap();

    let report = run_inactivity_check(&env.resources, now).await.unwrap();
    assert_eq!(report.triggered, 0);

    let later = run_inactivity_check(&env.resources, now + Duration::hours(18))
        .await
        .unwrap();
    assert_eq!(later.triggered, 1);
}

#[tokio::test]
async fn owner_is_reminded_once_per_episode() {
    let env = TestEnv::new().await;
    let now = common::now();
    insert_event(env.db(), "ev1", "alice", "1 day", now - Duration::hours(22), EventStatus::Running).await;
    insert_profile(env.db(), "alice", Some("alice@example.com")).await;

    let first = run_inactivity_check(&env.resources, now).await.unwrap();
    assert_eq!(first.reminders, 1);
    assert_eq!(env.email.recipients(), ["alice@example.com"]);
    let logs = logs_for(&env, "ev1").await;
    assert_eq!(logs[0].category, NotificationCategory::UserReminder);
    assert_eq!(logs[0].contact_id, None);

    let second = run_inactivity_check(&env.resources, now + Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(second.reminders, 0);
    assert_eq!(env.email.count(), 1);
    assert_eq!(reload(&env, "ev1").await.status, EventStatus::Running);
}

#[tokio::test]
async fn owner_learns_about_the_trigger() {
    let env = TestEnv::new().await;
    let now = common::now();
    insert_event(env.db(), "ev1", "alice", "1 hour", now - Duration::hours(2), EventStatus::Running).await;
    insert_profile(env.db(), "alice", Some("alice@example.com")).await;

    run_inactivity_check(&env.resources, now).await.unwrap();
    let owner_logs: Vec<_> = logs_for(&env, "ev1")
        .await
        .into_iter()
        .filter(|l| l.category == NotificationCategory::EventTrigger)
        .collect();
    assert_eq!(owner_logs.len(), 1);
    assert!(owner_logs[0].content.contains("No contacts could be reached"));
}

#[tokio::test]
async fn forced_notify_keeps_status() {
    let env = TestEnv::new().await;
    let now = common::now();
    insert_event(env.db(), "ev1", "alice", "1 week", now, EventStatus::Paused).await;
    insert_event(env.db(), "ev2", "alice", "1 week", now, EventStatus::Running).await;
    insert_contact(env.db(), "c1", "alice", Some("bob@example.com"), Some("+15550002222"), ContactPreference::Both).await;
    link(env.db(), "ev1", "c1").await;

    let report = run_notify(
        &env.resources,
        NotifyRequest {
            event_ids: Some(vec!["ev1".into()]),
            force: true,
        },
        now,
    )
    .await
    .unwrap();

    assert_eq!(report.processed.len(), 1);
    let processed = &report.processed[0];
    assert!(processed.forced);
    assert!(!processed.triggered);
    assert_eq!(processed.contacts_notified, 1);
    assert_eq!(env.email.count(), 1);
    assert_eq!(env.sms.recipients(), ["+15550002222"]);

    let stored = reload(&env, "ev1").await;
    assert_eq!(stored.status, EventStatus::Paused);
    assert_eq!(stored.last_trigger_time, None);

    let manual = activities(&env, ActivityAction::ManualNotify).await;
    assert_eq!(manual.len(), 1);
    assert_eq!(manual[0].details().get("forced"), Some("true"));
    assert_eq!(manual[0].details().get("contacts_notified"), Some("1"));
}

#[tokio::test]
async fn unforced_notify_only_touches_requested_events() {
    let env = TestEnv::new().await;
    let now = common::now();
    let stale = now - Duration::days(3);
    insert_event(env.db(), "ev1", "alice", "1 day", stale, EventStatus::Running).await;
    insert_event(env.db(), "ev2", "alice", "1 day", stale, EventStatus::Running).await;

    let report = run_notify(
        &env.resources,
        NotifyRequest {
            event_ids: Some(vec!["ev2".into()]),
            force: false,
        },
        now,
    )
    .await
    .unwrap();
    assert_eq!(report.triggered, 1);
    assert_eq!(reload(&env, "ev1").await.status, EventStatus::Running);
    assert_eq!(reload(&env, "ev2").await.status, EventStatus::Triggered);
}

#[tokio::test]
async fn system_check_is_recorded() {
    let env = TestEnv::new().await;
    let now = common::now();
    insert_event(env.db(), "ev1", "alice", "1 day", now - Duration::days(2), EventStatus::Running).await;
    insert_event(env.db(), "ev2", "bob", "1 day", now, EventStatus::Running).await;

    run_inactivity_check(&env.resources, now).await.unwrap();

    let checks = activities(&env, ActivityAction::SystemCheck).await;
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].owner_id, None);
    let details = checks[0].details();
    assert_eq!(details.get("evaluated"), Some("2"));
    assert_eq!(details.get("triggered"), Some("1"));
    assert_eq!(details.get("reminders"), Some("0"));
}

#[tokio::test]
async fn contact_lookup_failure_leaves_event_for_the_next_cycle() {
    let env = TestEnv::new().await;
    let now = common::now();
    insert_event(env.db(), "ev1", "alice", "1 day", now - Duration::hours(30), EventStatus::Running).await;
    insert_contact(env.db(), "c1", "alice", Some("bob@example.com"), None, ContactPreference::Email).await;
    link(env.db(), "ev1", "c1").await;

    env.db()
        .execute_unprepared("ALTER TABLE event_contact RENAME TO event_contact_moved")
        .await
        .unwrap();
    let failed = run_inactivity_check(&env.resources, now).await.unwrap();
    assert_eq!(failed.processed.len(), 1);
    assert!(!failed.processed[0].triggered);
    assert!(failed.processed[0].error.is_some());
    assert_eq!(reload(&env, "ev1").await.status, EventStatus::Running);
    assert_eq!(env.email.count(), 0);

    env.db()
        .execute_unprepared("ALTER TABLE event_contact_moved RENAME TO event_contact")
        .await
        .unwrap();
    let retried = run_inactivity_check(&env.resources, now + Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(retried.triggered, 1);
    assert_eq!(retried.processed[0].contacts_notified, 1);
    assert_eq!(env.email.recipients(), ["bob@example.com"]);
    assert_eq!(reload(&env, "ev1").await.status, EventStatus::Triggered);
}

#[tokio::test]
async fn forced_notify_reports_success_when_audit_row_fails() {
    let env = TestEnv::new().await;
    let now = common::now();
    insert_event(env.db(), "ev1", "alice", "1 day", now, EventStatus::Running).await;
    insert_contact(env.db(), "c1", "alice", Some("bob@example.com"), None, ContactPreference::Email).await;
    link(env.db(), "ev1", "c1").await;
    env.db()
        .execute_unprepared("DROP TABLE activity_log")
        .await
        .unwrap();

    let report = run_notify(
        &env.resources,
        NotifyRequest {
            event_ids: Some(vec!["ev1".into()]),
            force: true,
        },
        now,
    )
    .await
    .unwrap();
    assert_eq!(report.processed.len(), 1);
    assert_eq!(report.processed[0].error, None);
    assert_eq!(report.processed[0].contacts_notified, 1);
    assert_eq!(env.email.recipients(), ["bob@example.com"]);
}
