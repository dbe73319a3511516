//! Email delivery over SMTP.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::entity::notification_log::NotificationChannel;
use crate::error::SendError;
use crate::notify::sender::{NotificationSender, OutgoingMessage};

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailSender {
    pub fn new(mailer: AsyncSmtpTransport<Tokio1Executor>, from: Mailbox) -> Self {
        Self { mailer, from }
    }

    pub fn from_config(cfg: &SmtpConfig) -> Result<Self, SendError> {
        let creds = Credentials::new(cfg.username.clone(), cfg.password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.server)
            .map_err(|e| SendError::Build(format!("SMTP relay {}: {e}", cfg.server)))?
            .port(cfg.port)
            .credentials(creds)
            .build();
        let from = cfg
            .from
            .parse::<Mailbox>()
            .map_err(|e| SendError::Build(format!("invalid from address: {e}")))?;
        Ok(Self::new(mailer, from))
    }

    pub fn build_message(&self, message: &OutgoingMessage) -> Result<Message, SendError> {
        let to = message
            .recipient
            .trim()
            .parse::<Mailbox>()
            .map_err(|e| SendError::InvalidRecipient(e.to_string()))?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| SendError::Build(e.to_string()))
    }
}

#[async_trait]
impl NotificationSender for EmailSender {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Email
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<(), SendError> {
        let email = self.build_message(message)?;
        match self.mailer.send(email).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_permanent() => Err(SendError::Rejected(e.to_string())),
            Err(e) => Err(SendError::Network(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> EmailSender {
        let mailer =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous("localhost").build();
        EmailSender::new(mailer, "StayConnected <alerts@example.org>".parse().unwrap())
    }

    fn outgoing(recipient: &str) -> OutgoingMessage {
        OutgoingMessage {
            channel: NotificationChannel::Email,
            recipient: recipient.into(),
            subject: "Missed check-in".into(),
            body: "Please reach out.".into(),
        }
    }

    #[tokio::test]
    async fn builds_plain_text_message() {
        let message = sender().build_message(&outgoing("bob@example.com")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: bob@example.com"));
        assert!(raw.contains("Subject: Missed check-in"));
        assert!(raw.contains("Please reach out."));
    }

    #[tokio::test]
    async fn rejects_malformed_recipient() {
        let err = sender().build_message(&outgoing("not-an-address")).unwrap_err();
        assert!(matches!(err, SendError::InvalidRecipient(_)));
    }
}
