//! Shared fixtures: an in-memory SQLite schema, recording senders and resource builders.
#![allow(dead_code)]

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, Database, DatabaseConnection, DbBackend,
    EntityTrait, Statement,
};
use stay_connected::AppResources;
use stay_connected::api::auth::issue_user_token;
use stay_connected::config::{
    AppConfig, AuthConfig, DeliveryConfig, DeliveryPolicy, ReminderConfig, SchedulerConfig,
};
use stay_connected::domain_events::DomainEventBus;
use stay_connected::entity::contact::{self, ContactPreference};
use stay_connected::entity::event::{self, EventStatus};
use stay_connected::entity::notification_log::NotificationChannel;
use stay_connected::entity::{event_contact, user_profile};
use stay_connected::error::SendError;
use stay_connected::notify::http::HttpClient;
use stay_connected::notify::{NotificationSender, OutgoingMessage, SenderRegistry};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use time::{Duration, OffsetDateTime};

pub const JWT_SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const SERVICE_TOKEN: &str = "cron-secret";

/// Create an in-memory SQLite database with every table the service uses.
pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory database");

    let tables = [
        r#"CREATE TABLE event (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            memo TEXT NULL,
            check_in_frequency TEXT NOT NULL,
            missed_checkin_threshold INTEGER NOT NULL DEFAULT 1,
            last_check_in TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'running',
            last_trigger_time TEXT NULL,
            last_reminder_at TEXT NULL,
            muted INTEGER NOT NULL DEFAULT 0,
            notification_content TEXT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE contact (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            email TEXT NULL,
            phone TEXT NULL,
            notification_preference TEXT NOT NULL DEFAULT 'email',
            deleted INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE event_contact (
            event_id TEXT NOT NULL,
            contact_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (event_id, contact_id)
        );"#,
        r#"CREATE TABLE notification_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT NOT NULL,
            contact_id TEXT NULL,
            channel TEXT NOT NULL,
            recipient TEXT NOT NULL,
            content TEXT NOT NULL,
            category TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            error_message TEXT NULL,
            sent_at TEXT NULL,
            created_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE activity_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT NULL,
            event_id TEXT NULL,
            contact_id TEXT NULL,
            action TEXT NOT NULL,
            details TEXT NULL,
            created_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE user_profile (
            owner_id TEXT PRIMARY KEY,
            email TEXT NULL,
            phone TEXT NULL,
            push_token TEXT NULL,
            email_from TEXT NULL,
            sms_account_sid TEXT NULL,
            sms_auth_token TEXT NULL,
            sms_from_number TEXT NULL,
            updated_at TEXT NOT NULL
        );"#,
    ];
    for sql in tables {
        db.execute(Statement::from_string(DbBackend::Sqlite, sql))
            .await
            .expect("Failed to create table");
    }
    db
}

/// Records every message and fails for the recipients it was told to.
pub struct RecordingSender {
    channel: NotificationChannel,
    failing: HashSet<String>,
    pub sent: Mutex<Vec<OutgoingMessage>>,
}

impl RecordingSender {
    pub fn new(channel: NotificationChannel) -> Arc<Self> {
        Arc::new(Self {
            channel,
            failing: HashSet::new(),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_for(channel: NotificationChannel, recipients: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            channel,
            failing: recipients.iter().map(|r| r.to_string()).collect(),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn recipients(&self) -> Vec<String> {
        let mut recipients: Vec<String> = self
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.recipient.clone())
            .collect();
        recipients.sort();
        recipients
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    fn channel(&self) -> NotificationChannel {
        self.channel
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<(), SendError> {
        if self.failing.contains(&message.recipient) {
            return Err(SendError::InvalidRecipient(format!(
                "{} is not reachable",
                message.recipient
            )));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub fn test_config() -> AppConfig {
    let fast = DeliveryPolicy {
        timeout_secs: 2,
        max_attempts: 1,
        retry_delay_ms: 1,
    };
    AppConfig {
        database_url: "sqlite::memory:".into(),
        listen_addr: "127.0.0.1:0".into(),
        auth: AuthConfig {
            jwt_secret: JWT_SECRET.into(),
            service_token: SERVICE_TOKEN.into(),
        },
        smtp: None,
        sms: None,
        push: None,
        delivery: DeliveryConfig {
            email: fast,
            sms: fast,
            push: fast,
        },
        scheduler: SchedulerConfig::default(),
        reminders: ReminderConfig::default(),
    }
}

/// Email and SMS recorders plus the resources that route through them.
pub struct TestEnv {
    pub resources: AppResources,
    pub email: Arc<RecordingSender>,
    pub sms: Arc<RecordingSender>,
    pub push: Arc<RecordingSender>,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_senders(
            RecordingSender::new(NotificationChannel::Email),
            RecordingSender::new(NotificationChannel::Sms),
        )
        .await
    }

    pub async fn with_senders(email: Arc<RecordingSender>, sms: Arc<RecordingSender>) -> Self {
        let push = RecordingSender::new(NotificationChannel::Push);
        let config = test_config();
        let senders = SenderRegistry::new()
            .with_sender(email.clone())
            .with_sender(sms.clone())
            .with_sender(push.clone())
            .with_policy(NotificationChannel::Email, config.delivery.email)
            .with_policy(NotificationChannel::Sms, config.delivery.sms)
            .with_policy(NotificationChannel::Push, config.delivery.push);
        let resources = AppResources {
            db: Arc::new(setup_test_db().await),
            senders: Arc::new(senders),
            http: HttpClient::new().expect("http client"),
            config: Arc::new(config),
            bus: DomainEventBus::new(),
        };
        Self {
            resources,
            email,
            sms,
            push,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        self.resources.db.as_ref()
    }
}

pub fn token_for(owner_id: &str) -> String {
    issue_user_token(
        JWT_SECRET,
        owner_id,
        OffsetDateTime::now_utc() + Duration::hours(1),
    )
    .expect("issue token")
}

pub async fn insert_event(
    db: &DatabaseConnection,
    id: &str,
    owner_id: &str,
    frequency: &str,
    last_check_in: OffsetDateTime,
    status: EventStatus,
) -> event::Model {
    event::ActiveModel {
        id: Set(id.to_string()),
        owner_id: Set(owner_id.to_string()),
        name: Set(format!("Event {id}")),
        memo: Set(None),
        check_in_frequency: Set(frequency.to_string()),
        missed_checkin_threshold: Set(1),
        last_check_in: Set(last_check_in),
        status: Set(status),
        last_trigger_time: Set(None),
        last_reminder_at: Set(None),
        muted: Set(false),
        notification_content: Set(None),
        deleted: Set(false),
        created_at: Set(last_check_in),
        updated_at: Set(last_check_in),
    }
    .insert(db)
    .await
    .expect("insert event")
}

pub async fn insert_contact(
    db: &DatabaseConnection,
    id: &str,
    owner_id: &str,
    email: Option<&str>,
    phone: Option<&str>,
    preference: ContactPreference,
) -> contact::Model {
    let now = OffsetDateTime::now_utc();
    contact::ActiveModel {
        id: Set(id.to_string()),
        owner_id: Set(owner_id.to_string()),
        name: Set(format!("Contact {id}")),
        email: Set(email.map(str::to_string)),
        phone: Set(phone.map(str::to_string)),
        notification_preference: Set(preference),
        deleted: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("insert contact")
}

pub async fn link(db: &DatabaseConnection, event_id: &str, contact_id: &str) {
    event_contact::Entity::insert(event_contact::ActiveModel {
        event_id: Set(event_id.to_string()),
        contact_id: Set(contact_id.to_string()),
        created_at: Set(OffsetDateTime::now_utc()),
    })
    .exec_without_returning(db)
    .await
    .expect("link contact");
}

pub async fn insert_profile(db: &DatabaseConnection, owner_id: &str, email: Option<&str>) {
    user_profile::ActiveModel {
        owner_id: Set(owner_id.to_string()),
        email: Set(email.map(str::to_string)),
        phone: Set(None),
        push_token: Set(None),
        email_from: Set(None),
        sms_account_sid: Set(None),
        sms_auth_token: Set(None),
        sms_from_number: Set(None),
        updated_at: Set(OffsetDateTime::now_utc()),
    }
    .insert(db)
    .await
    .expect("insert profile");
}

/// Current time at whole-second precision so values survive the SQLite text round trip.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
        .replace_nanosecond(0)
        .expect("zero is a valid nanosecond")
}
