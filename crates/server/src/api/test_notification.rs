//! Test-notification endpoint: sends a fixed message to one contact so the owner can
//! confirm the contact's details and their own provider settings.

use crate::AppResources;
use crate::activity::{NewActivity, record_activity};
use crate::api::auth::{ApiError, AuthUser};
use crate::config::{DEFAULT_SMS_API_BASE, SmtpConfig};
use crate::entity::activity_log::ActivityAction;
use crate::entity::notification_log::NotificationChannel;
use crate::entity::{contact, user_profile};
use crate::error::{SendError, ServiceError};
use crate::notify::email::EmailSender;
use crate::notify::sender::{OutgoingMessage, deliver_with_policy};
use crate::notify::sms::{SmsCredentials, SmsSender};
use crate::notify::templates;
use axum::{Extension, Json};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

pub const TEST_NOTIFICATION_TAG: &str = "Test Notification";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Email,
    Sms,
    Both,
}

impl NotificationType {
    fn channels(self) -> &'static [NotificationChannel] {
        match self {
            NotificationType::Email => &[NotificationChannel::Email],
            NotificationType::Sms => &[NotificationChannel::Sms],
            NotificationType::Both => &[NotificationChannel::Email, NotificationChannel::Sms],
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestNotificationRequest {
    pub contact_id: String,
    pub notification_type: NotificationType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChannelResult {
    pub sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct TestNotificationResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<ChannelResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sms: Option<ChannelResult>,
}

/// Deliver through the owner's own provider settings when they have them, otherwise
/// through the service-wide sender.
async fn send_test(
    resources: &AppResources,
    profile: Option<&user_profile::Model>,
    message: &OutgoingMessage,
) -> Result<(), SendError> {
    let policy = resources.senders.policy(message.channel);
    match message.channel {
        NotificationChannel::Email => {
            let from = profile
                .and_then(|p| p.email_from.as_deref())
                .map(str::trim)
                .filter(|f| !f.is_empty());
            match (from, resources.config.smtp.as_ref()) {
                (Some(from), Some(smtp)) => {
                    let sender = EmailSender::from_config(&SmtpConfig {
                        from: from.to_string(),
                        ..smtp.clone()
                    })?;
                    deliver_with_policy(&sender, policy, message).await
                }
                _ => resources.senders.deliver(message).await,
            }
        }
        NotificationChannel::Sms => {
            let api_base = resources
                .config
                .sms
                .as_ref()
                .map(|s| s.api_base.as_str())
                .unwrap_or(DEFAULT_SMS_API_BASE);
            match profile.and_then(|p| SmsCredentials::from_profile(p, api_base)) {
                Some(credentials) => {
                    let sender = SmsSender::new(resources.http.clone(), credentials);
                    deliver_with_policy(&sender, policy, message).await
                }
                None => resources.senders.deliver(message).await,
            }
        }
        NotificationChannel::Push => resources.senders.deliver(message).await,
    }
}

#[tracing::instrument(skip(resources, auth, payload), fields(contact_id = %payload.contact_id))]
#[utoipa::path(
    post,
    path = "/api/test-notification",
    tag = TEST_NOTIFICATION_TAG,
    operation_id = "Send Test Notification",
    summary = "Send a test message to one contact",
    description = "Sends a fixed test message on the requested channels. Per-user provider settings \
                   from the caller's profile take precedence over the service configuration. Each \
                   channel reports its own outcome; one failing channel does not stop the other.",
    security(("User" = [])),
    request_body(content = TestNotificationRequest),
    responses(
        (status = 200, description = "Per-channel outcome", body = TestNotificationResponse),
        (status = 401, description = "Missing or invalid session token", body = ApiError),
        (status = 403, description = "Contact belongs to another user", body = ApiError),
        (status = 404, description = "Unknown or deleted contact", body = ApiError),
    )
)]
pub async fn test_notification(
    Extension(resources): Extension<AppResources>,
    auth: AuthUser,
    Json(payload): Json<TestNotificationRequest>,
) -> Result<Json<TestNotificationResponse>, ApiError> {
    let db = resources.db.as_ref();
    let target = contact::Entity::find_by_id(payload.contact_id.clone())
        .one(db)
        .await
        .map_err(ServiceError::from)?
        .filter(|c| !c.deleted)
        .ok_or_else(|| ApiError::not_found(format!("contact {}", payload.contact_id)))?;
    if target.owner_id != auth.owner_id {
        return Err(ApiError::forbidden("contact belongs to another user"));
    }
    let profile = user_profile::Entity::find_by_id(auth.owner_id.clone())
        .one(db)
        .await
        .map_err(ServiceError::from)?;

    let content = templates::test_message(&target.name);
    let mut response = TestNotificationResponse::default();
    let mut attempted = Vec::new();

    for &channel in payload.notification_type.channels() {
        let result = match target.recipient_for(channel) {
            Some(recipient) => {
                attempted.push(channel.as_str());
                let message = OutgoingMessage {
                    channel,
                    recipient: recipient.to_string(),
                    subject: content.subject.clone(),
                    body: content.body.clone(),
                };
                match send_test(&resources, profile.as_ref(), &message).await {
                    Ok(()) => ChannelResult {
                        sent: true,
                        error: None,
                    },
                    Err(e) => {
                        tracing::warn!(
                            name = "api.test_notification.failed",
                            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                            channel = %channel,
                            error = %e,
                            message = "Test notification failed"
                        );
                        ChannelResult {
                            sent: false,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
            None => ChannelResult {
                sent: false,
                error: Some(format!("Contact has no {channel} recipient")),
            },
        };
        match channel {
            NotificationChannel::Email => response.email = Some(result),
            NotificationChannel::Sms => response.sms = Some(result),
            NotificationChannel::Push => {}
        }
    }

    record_activity(
        db,
        NewActivity::new(ActivityAction::TestNotification)
            .owner(&auth.owner_id)
            .contact(&target.id)
            .detail("channels", attempted.join(",")),
        OffsetDateTime::now_utc(),
    )
    .await
    .map_err(ServiceError::from)?;

    Ok(Json(response))
}
