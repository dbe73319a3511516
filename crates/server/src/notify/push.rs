//! Push delivery through an Expo-compatible push API.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Request, header};
use serde::Deserialize;
use serde_json::json;

use crate::config::PushConfig;
use crate::entity::notification_log::NotificationChannel;
use crate::error::SendError;
use crate::notify::http::HttpClient;
use crate::notify::sender::{NotificationSender, OutgoingMessage};

pub struct PushSender {
    http: HttpClient,
    api_url: String,
    access_token: Option<String>,
}

impl PushSender {
    pub fn new(http: HttpClient, config: &PushConfig) -> Self {
        Self {
            http,
            api_url: config.api_url.clone(),
            access_token: config.access_token.clone(),
        }
    }
}

/// The provider answers 200 even for per-ticket failures.
#[derive(Deserialize)]
struct PushResponse {
    data: Option<PushTicket>,
}

#[derive(Deserialize)]
struct PushTicket {
    status: String,
    message: Option<String>,
}

#[async_trait]
impl NotificationSender for PushSender {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Push
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<(), SendError> {
        let payload = json!({
            "to": message.recipient,
            "title": message.subject,
            "body": message.body,
            "sound": "default",
            "priority": "high",
        });

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(&self.api_url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json");
        if let Some(token) = &self.access_token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = builder
            .body(Full::new(Bytes::from(payload.to_string())))
            .map_err(|e| SendError::Build(e.to_string()))?;

        let (status, body) = self.http.execute(request).await?;
        if !status.is_success() {
            return Err(SendError::Provider { status, body });
        }

        match serde_json::from_str::<PushResponse>(&body) {
            Ok(PushResponse {
                data: Some(ticket),
            }) if ticket.status == "error" => Err(SendError::InvalidRecipient(
                ticket
                    .message
                    .unwrap_or_else(|| "push ticket rejected".to_string()),
            )),
            _ => Ok(()),
        }
    }
}
