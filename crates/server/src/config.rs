use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Twilio-compatible SMS provider credentials.
#[derive(Clone, Debug, Deserialize)]
pub struct SmsConfig {
    #[serde(default = "default_sms_api_base")]
    pub api_base: String,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

/// Expo-compatible push provider.
#[derive(Clone, Debug, Deserialize)]
pub struct PushConfig {
    #[serde(default = "default_push_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret used to verify user session tokens.
    pub jwt_secret: String,
    /// Bearer token accepted on operator and cron endpoints.
    pub service_token: String,
}

/// Outbound delivery bounds for one channel.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct DeliveryPolicy {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl DeliveryPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub email: DeliveryPolicy,
    #[serde(default)]
    pub sms: DeliveryPolicy,
    #[serde(default)]
    pub push: DeliveryPolicy,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SchedulerConfig {
    /// Run the inactivity check in-process instead of relying on an external cron.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_concurrent_events")]
    pub max_concurrent_events: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_interval_secs(),
            max_concurrent_events: default_max_concurrent_events(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReminderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fraction of the alert window after which the owner gets a reminder.
    #[serde(default = "default_lead_ratio")]
    pub lead_ratio: f64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lead_ratio: default_lead_ratio(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub auth: AuthConfig,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default)]
    pub sms: Option<SmsConfig>,
    #[serde(default)]
    pub push: Option<PushConfig>,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub reminders: ReminderConfig,
}

pub const DEFAULT_SMS_API_BASE: &str = "https://api.twilio.com";

fn default_sms_api_base() -> String {
    DEFAULT_SMS_API_BASE.to_string()
}

fn default_push_api_url() -> String {
    "https://exp.host/--/api/v2/push/send".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_interval_secs() -> u64 {
    300
}

fn default_max_concurrent_events() -> usize {
    8
}

fn default_lead_ratio() -> f64 {
    0.85
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Checks invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Validation("database_url must be set".into()));
        }
        if self.auth.jwt_secret.len() < 32 {
            return Err(ConfigError::Validation(
                "auth.jwt_secret must be at least 32 characters".into(),
            ));
        }
        if self.auth.service_token.is_empty() {
            return Err(ConfigError::Validation(
                "auth.service_token must be set".into(),
            ));
        }
        if let Some(smtp) = &self.smtp
            && smtp.port == 0
        {
            return Err(ConfigError::Validation("smtp.port must be > 0".into()));
        }
        for (name, policy) in [
            ("email", &self.delivery.email),
            ("sms", &self.delivery.sms),
            ("push", &self.delivery.push),
        ] {
            if policy.max_attempts == 0 {
                return Err(ConfigError::Validation(format!(
                    "delivery.{name}.max_attempts must be >= 1"
                )));
            }
            if policy.timeout_secs == 0 {
                return Err(ConfigError::Validation(format!(
                    "delivery.{name}.timeout_secs must be > 0"
                )));
            }
        }
        if !(self.reminders.lead_ratio > 0.0 && self.reminders.lead_ratio < 1.0) {
            return Err(ConfigError::Validation(
                "reminders.lead_ratio must be between 0 and 1".into(),
            ));
        }
        if self.scheduler.max_concurrent_events == 0 {
            return Err(ConfigError::Validation(
                "scheduler.max_concurrent_events must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path separated by double underscores
/// (e.g. `SMS__AUTH_TOKEN`) overrides the file value. The file itself is optional so
/// that container deployments can be configured from the environment alone.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Convenience helper for binaries that treat a bad configuration as fatal.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}
