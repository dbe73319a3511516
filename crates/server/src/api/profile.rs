//! The caller's own notification targets and provider overrides.

use crate::AppResources;
use crate::activity::{NewActivity, record_activity};
use crate::api::auth::{ApiError, AuthUser};
use crate::entity::activity_log::ActivityAction;
use crate::entity::user_profile;
use crate::error::ServiceError;
use axum::{Extension, Json};
use sea_orm::{ActiveModelTrait, ActiveValue, EntityTrait, TransactionTrait};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

pub const PROFILE_TAG: &str = "Profile";

/// Profile as shown to its owner; the SMS auth token is never returned.
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct ProfileView {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub push_token: Option<String>,
    pub email_from: Option<String>,
    pub sms_account_sid: Option<String>,
    pub sms_from_number: Option<String>,
    pub has_sms_auth_token: bool,
}

impl From<user_profile::Model> for ProfileView {
    fn from(p: user_profile::Model) -> Self {
        Self {
            has_sms_auth_token: p.sms_auth_token.as_deref().is_some_and(|t| !t.is_empty()),
            email: p.email,
            phone: p.phone,
            push_token: p.push_token,
            email_from: p.email_from,
            sms_account_sid: p.sms_account_sid,
            sms_from_number: p.sms_from_number,
        }
    }
}

/// Absent fields are kept; an empty string clears the field.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub push_token: Option<String>,
    pub email_from: Option<String>,
    pub sms_account_sid: Option<String>,
    pub sms_auth_token: Option<String>,
    pub sms_from_number: Option<String>,
}

#[tracing::instrument(skip(resources, auth), fields(owner_id = %auth.owner_id))]
#[utoipa::path(
    get,
    path = "/api/profile",
    tag = PROFILE_TAG,
    operation_id = "Get Profile",
    summary = "Get the caller's notification profile",
    security(("User" = [])),
    responses(
        (status = 200, description = "Profile; empty when never saved", body = ProfileView),
        (status = 401, description = "Missing or invalid session token", body = ApiError),
    )
)]
pub async fn get_profile(
    Extension(resources): Extension<AppResources>,
    auth: AuthUser,
) -> Result<Json<ProfileView>, ApiError> {
    let profile = user_profile::Entity::find_by_id(auth.owner_id)
        .one(resources.db.as_ref())
        .await
        .map_err(ServiceError::from)?;
    Ok(Json(profile.map(ProfileView::from).unwrap_or_default()))
}

#[tracing::instrument(skip(resources, auth, payload), fields(owner_id = %auth.owner_id))]
#[utoipa::path(
    put,
    path = "/api/profile",
    tag = PROFILE_TAG,
    operation_id = "Update Profile",
    summary = "Update the caller's notification profile",
    description = "Sets where the caller's own reminders go and optional per-user provider \
                   settings used by the test-notification endpoint.",
    security(("User" = [])),
    request_body(content = UpdateProfileRequest),
    responses(
        (status = 200, description = "Saved profile", body = ProfileView),
        (status = 400, description = "Invalid profile", body = ApiError),
        (status = 401, description = "Missing or invalid session token", body = ApiError),
    )
)]
pub async fn update_profile(
    Extension(resources): Extension<AppResources>,
    auth: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileView>, ApiError> {
    if let Some(email) = payload.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        email
            .parse::<lettre::Address>()
            .map_err(|e| ApiError::validation(format!("invalid email address: {e}")))?;
    }

    let now = OffsetDateTime::now_utc();
    let txn = resources.db.begin().await.map_err(ServiceError::from)?;
    let existing = user_profile::Entity::find_by_id(auth.owner_id.clone())
        .one(&txn)
        .await
        .map_err(ServiceError::from)?;
    let is_new = existing.is_none();
    let mut model: user_profile::ActiveModel = match existing {
        Some(p) => p.into(),
        None => user_profile::ActiveModel {
            owner_id: ActiveValue::Set(auth.owner_id.clone()),
            email: ActiveValue::Set(None),
            phone: ActiveValue::Set(None),
            push_token: ActiveValue::Set(None),
            email_from: ActiveValue::Set(None),
            sms_account_sid: ActiveValue::Set(None),
            sms_auth_token: ActiveValue::Set(None),
            sms_from_number: ActiveValue::Set(None),
            updated_at: ActiveValue::Set(now),
        },
    };

    let mut activity = NewActivity::new(ActivityAction::UpdateProfile).owner(&auth.owner_id);
    let fields = [
        ("email", payload.email, &mut model.email),
        ("phone", payload.phone, &mut model.phone),
        ("push_token", payload.push_token, &mut model.push_token),
        ("email_from", payload.email_from, &mut model.email_from),
        ("sms_account_sid", payload.sms_account_sid, &mut model.sms_account_sid),
        ("sms_auth_token", payload.sms_auth_token, &mut model.sms_auth_token),
        ("sms_from_number", payload.sms_from_number, &mut model.sms_from_number),
    ];
    for (field, value, slot) in fields {
        if let Some(value) = value {
            let value = value.trim().to_string();
            *slot = ActiveValue::Set((!value.is_empty()).then_some(value));
            activity = activity.detail(field, "changed");
        }
    }
    model.updated_at = ActiveValue::Set(now);

    let saved = if is_new {
        model.insert(&txn).await
    } else {
        model.update(&txn).await
    }
    .map_err(ServiceError::from)?;
    record_activity(&txn, activity, now)
        .await
        .map_err(ServiceError::from)?;
    txn.commit().await.map_err(ServiceError::from)?;

    Ok(Json(saved.into()))
}
