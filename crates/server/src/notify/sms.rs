//! SMS delivery through a Twilio-compatible REST API.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Request, header};
use url::form_urlencoded;

use crate::config::SmsConfig;
use crate::entity::notification_log::NotificationChannel;
use crate::entity::user_profile;
use crate::error::SendError;
use crate::notify::http::HttpClient;
use crate::notify::sender::{NotificationSender, OutgoingMessage};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmsCredentials {
    pub api_base: String,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

impl From<&SmsConfig> for SmsCredentials {
    fn from(cfg: &SmsConfig) -> Self {
        Self {
            api_base: cfg.api_base.clone(),
            account_sid: cfg.account_sid.clone(),
            auth_token: cfg.auth_token.clone(),
            from_number: cfg.from_number.clone(),
        }
    }
}

impl SmsCredentials {
    /// Per-user credentials, if the profile carries a complete set.
    pub fn from_profile(profile: &user_profile::Model, api_base: &str) -> Option<Self> {
        let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.trim().is_empty()).map(str::to_string);
        Some(Self {
            api_base: api_base.to_string(),
            account_sid: non_empty(&profile.sms_account_sid)?,
            auth_token: non_empty(&profile.sms_auth_token)?,
            from_number: non_empty(&profile.sms_from_number)?,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base.trim_end_matches('/'),
            self.account_sid
        )
    }

    fn basic_auth(&self) -> String {
        let raw = format!("{}:{}", self.account_sid, self.auth_token);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

pub struct SmsSender {
    http: HttpClient,
    credentials: SmsCredentials,
}

impl SmsSender {
    pub fn new(http: HttpClient, credentials: SmsCredentials) -> Self {
        Self { http, credentials }
    }
}

/// Loose shape check; the provider does the real validation.
fn looks_like_phone_number(value: &str) -> bool {
    let digits = value.chars().filter(char::is_ascii_digit).count();
    digits >= 7
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')' | '.'))
}

#[async_trait]
impl NotificationSender for SmsSender {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Sms
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<(), SendError> {
        let to = message.recipient.trim();
        if !looks_like_phone_number(to) {
            return Err(SendError::InvalidRecipient(format!(
                "'{to}' is not a phone number"
            )));
        }

        let form = form_urlencoded::Serializer::new(String::new())
            .append_pair("To", to)
            .append_pair("From", &self.credentials.from_number)
            .append_pair("Body", &message.body)
            .finish();

        let request = Request::builder()
            .method(Method::POST)
            .uri(self.credentials.messages_url())
            .header(header::AUTHORIZATION, self.credentials.basic_auth())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Full::new(Bytes::from(form)))
            .map_err(|e| SendError::Build(e.to_string()))?;

        let (status, body) = self.http.execute(request).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(SendError::Provider { status, body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_number_shape() {
        assert!(looks_like_phone_number("+15551234567"));
        assert!(looks_like_phone_number("(555) 123-4567"));
        assert!(!looks_like_phone_number("alice@example.com"));
        assert!(!looks_like_phone_number("123"));
    }

    #[test]
    fn builds_twilio_url_and_auth() {
        let creds = SmsCredentials {
            api_base: "https://api.twilio.com/".into(),
            account_sid: "AC1".into(),
            auth_token: "secret".into(),
            from_number: "+15550000000".into(),
        };
        assert_eq!(
            creds.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC1/Messages.json"
        );
        assert_eq!(creds.basic_auth(), format!("Basic {}", STANDARD.encode("AC1:secret")));
    }
}
