//! Uniform interface over the email, SMS and push providers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::{AppConfig, DeliveryPolicy};
use crate::entity::notification_log::NotificationChannel;
use crate::error::SendError;
use crate::notify::email::EmailSender;
use crate::notify::http::HttpClient;
use crate::notify::push::PushSender;
use crate::notify::sms::{SmsCredentials, SmsSender};

/// One message to one recipient on one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub channel: NotificationChannel,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    fn channel(&self) -> NotificationChannel;

    async fn send(&self, message: &OutgoingMessage) -> Result<(), SendError>;
}

/// Call `sender` under `policy`: every attempt is bounded by the timeout and retryable
/// failures are retried after a fixed delay until `max_attempts` is reached.
pub async fn deliver_with_policy(
    sender: &dyn NotificationSender,
    policy: DeliveryPolicy,
    message: &OutgoingMessage,
) -> Result<(), SendError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(policy.timeout(), sender.send(message)).await {
            Ok(result) => result,
            Err(_) => Err(SendError::Timeout(policy.timeout())),
        };
        match result {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    name = "notify.deliver.retry",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    channel = %message.channel,
                    attempt = attempt,
                    error = %e,
                    message = "Delivery attempt failed, retrying"
                );
                tokio::time::sleep(policy.retry_delay()).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// The configured sender and delivery policy for each channel.
#[derive(Clone, Default)]
pub struct SenderRegistry {
    senders: HashMap<NotificationChannel, Arc<dyn NotificationSender>>,
    policies: HashMap<NotificationChannel, DeliveryPolicy>,
}

impl fmt::Debug for SenderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut configured: Vec<&str> = self.senders.keys().map(|c| c.as_str()).collect();
        configured.sort_unstable();
        f.debug_struct("SenderRegistry")
            .field("configured", &configured)
            .field("policies", &self.policies)
            .finish()
    }
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sender` for the channel it reports.
    pub fn with_sender(mut self, sender: Arc<dyn NotificationSender>) -> Self {
        self.senders.insert(sender.channel(), sender);
        self
    }

    pub fn with_policy(mut self, channel: NotificationChannel, policy: DeliveryPolicy) -> Self {
        self.policies.insert(channel, policy);
        self
    }

    /// Build senders for every provider section present in `config`.
    ///
    /// Absent sections leave the channel unconfigured; attempts on it fail softly.
    pub fn from_config(config: &AppConfig, http: &HttpClient) -> Result<Self, SendError> {
        let mut registry = Self::new()
            .with_policy(NotificationChannel::Email, config.delivery.email)
            .with_policy(NotificationChannel::Sms, config.delivery.sms)
            .with_policy(NotificationChannel::Push, config.delivery.push);

        if let Some(smtp) = &config.smtp {
            registry = registry.with_sender(Arc::new(EmailSender::from_config(smtp)?));
        }
        if let Some(sms) = &config.sms {
            registry = registry.with_sender(Arc::new(SmsSender::new(
                http.clone(),
                SmsCredentials::from(sms),
            )));
        }
        if let Some(push) = &config.push {
            registry = registry.with_sender(Arc::new(PushSender::new(http.clone(), push)));
        }

        tracing::info!(
            name = "notify.registry.built",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            email = registry.is_configured(NotificationChannel::Email),
            sms = registry.is_configured(NotificationChannel::Sms),
            push = registry.is_configured(NotificationChannel::Push),
            message = "Notification senders configured"
        );
        Ok(registry)
    }

    pub fn is_configured(&self, channel: NotificationChannel) -> bool {
        self.senders.contains_key(&channel)
    }

    pub fn policy(&self, channel: NotificationChannel) -> DeliveryPolicy {
        self.policies.get(&channel).copied().unwrap_or_default()
    }

    /// Deliver through the sender registered for `message.channel`.
    #[tracing::instrument(skip(self, message), fields(channel = %message.channel))]
    pub async fn deliver(&self, message: &OutgoingMessage) -> Result<(), SendError> {
        let sender = self
            .senders
            .get(&message.channel)
            .ok_or(SendError::NotConfigured(message.channel.as_str()))?;
        deliver_with_policy(sender.as_ref(), self.policy(message.channel), message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::StatusCode;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` calls with `error`, then succeeds.
    struct Flaky {
        calls: AtomicU32,
        failures: u32,
        error: fn() -> SendError,
        delay: Option<Duration>,
        seen: Mutex<Vec<String>>,
    }

    impl Flaky {
        fn new(failures: u32, error: fn() -> SendError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
                error,
                delay: None,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NotificationSender for Flaky {
        fn channel(&self) -> NotificationChannel {
            NotificationChannel::Sms
        }

        async fn send(&self, message: &OutgoingMessage) -> Result<(), SendError> {
            self.seen.lock().unwrap().push(message.recipient.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err((self.error)())
            } else {
                Ok(())
            }
        }
    }

    fn policy(max_attempts: u32) -> DeliveryPolicy {
        DeliveryPolicy {
            timeout_secs: 1,
            max_attempts,
            retry_delay_ms: 1,
        }
    }

    fn message() -> OutgoingMessage {
        OutgoingMessage {
            channel: NotificationChannel::Sms,
            recipient: "+15550001111".into(),
            subject: "s".into(),
            body: "b".into(),
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let sender = Flaky::new(2, || SendError::Network("reset".into()));
        deliver_with_policy(&sender, policy(3), &message())
            .await
            .unwrap();
        assert_eq!(sender.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let sender = Flaky::new(10, || SendError::Provider {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: "down".into(),
        });
        let err = deliver_with_policy(&sender, policy(3), &message())
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Provider { .. }));
        assert_eq!(sender.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let sender = Flaky::new(10, || SendError::InvalidRecipient("bad".into()));
        assert!(
            deliver_with_policy(&sender, policy(5), &message())
                .await
                .is_err()
        );
        assert_eq!(sender.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_provider_times_out() {
        let mut sender = Flaky::new(0, || SendError::Network("unused".into()));
        sender.delay = Some(Duration::from_secs(60));
        let err = deliver_with_policy(&sender, policy(2), &message())
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Timeout(_)));
        assert_eq!(sender.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unconfigured_channel_is_reported() {
        let registry = SenderRegistry::new();
        let err = registry.deliver(&message()).await.unwrap_err();
        assert!(matches!(err, SendError::NotConfigured("sms")));
        assert_eq!(registry.policy(NotificationChannel::Sms), DeliveryPolicy::default());
    }

    #[tokio::test]
    async fn registry_routes_by_channel() {
        let flaky = Arc::new(Flaky::new(0, || SendError::Network("unused".into())));
        let registry = SenderRegistry::new()
            .with_sender(flaky.clone())
            .with_policy(NotificationChannel::Sms, policy(1));
        registry.deliver(&message()).await.unwrap();
        assert!(registry.is_configured(NotificationChannel::Sms));
        assert!(!registry.is_configured(NotificationChannel::Email));
        assert_eq!(flaky.seen.lock().unwrap().as_slice(), ["+15550001111"]);
    }
}
