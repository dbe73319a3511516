//! Emergency contact endpoints.

use crate::AppResources;
use crate::activity::{NewActivity, record_activity};
use crate::api::auth::{ApiError, AuthUser};
use crate::domain_events::DomainEvent;
use crate::entity::activity_log::ActivityAction;
use crate::entity::contact::{self, ContactPreference};
use crate::entity::notification_log::NotificationChannel;
use crate::error::ServiceError;
use axum::{Extension, Json, extract::Path};
use hyper::StatusCode;
use lettre::Address;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

pub const CONTACTS_TAG: &str = "Contacts";

#[derive(Debug, Serialize, ToSchema)]
pub struct ContactView {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub notification_preference: ContactPreference,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<contact::Model> for ContactView {
    fn from(c: contact::Model) -> Self {
        Self {
            id: c.id,
            name: c.name,
            email: c.email,
            phone: c.phone,
            notification_preference: c.notification_preference,
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateContactRequest {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Defaults to every channel the contact has a recipient for
    #[serde(default)]
    pub notification_preference: Option<ContactPreference>,
}

/// A contact that passed validation.
#[derive(Debug, PartialEq, Eq)]
struct ValidContact {
    name: String,
    email: Option<String>,
    phone: Option<String>,
    preference: ContactPreference,
}

fn validate_contact(req: CreateContactRequest) -> Result<ValidContact, ServiceError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ServiceError::Validation("name is required".into()));
    }
    let email = req
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());
    let phone = req
        .phone
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());

    if let Some(email) = &email {
        email
            .parse::<Address>()
            .map_err(|e| ServiceError::Validation(format!("invalid email address: {e}")))?;
    }
    if let Some(phone) = &phone
        && phone.chars().filter(char::is_ascii_digit).count() < 7
    {
        return Err(ServiceError::Validation("invalid phone number".into()));
    }

    let preference = match (req.notification_preference, &email, &phone) {
        (_, None, None) => {
            return Err(ServiceError::Validation(
                "an email address or phone number is required".into(),
            ));
        }
        (Some(pref), _, _) => pref,
        (None, Some(_), Some(_)) => ContactPreference::Both,
        (None, Some(_), None) => ContactPreference::Email,
        (None, None, Some(_)) => ContactPreference::Sms,
    };
    for (channel, value) in [
        (NotificationChannel::Email, &email),
        (NotificationChannel::Sms, &phone),
    ] {
        if preference.allows(channel) && value.is_none() {
            return Err(ServiceError::Validation(format!(
                "preference {preference:?} needs a {channel} recipient"
            )));
        }
    }

    Ok(ValidContact {
        name,
        email,
        phone,
        preference,
    })
}

#[tracing::instrument(skip(resources, auth), fields(owner_id = %auth.owner_id))]
#[utoipa::path(
    get,
    path = "/api/contacts",
    tag = CONTACTS_TAG,
    operation_id = "List Contacts",
    summary = "List the caller's contacts",
    security(("User" = [])),
    responses(
        (status = 200, description = "Contacts", body = Vec<ContactView>),
        (status = 401, description = "Missing or invalid session token", body = ApiError),
    )
)]
pub async fn list_contacts(
    Extension(resources): Extension<AppResources>,
    auth: AuthUser,
) -> Result<Json<Vec<ContactView>>, ApiError> {
    let contacts = contact::Entity::find()
        .filter(contact::Column::OwnerId.eq(auth.owner_id.as_str()))
        .filter(contact::Column::Deleted.eq(false))
        .order_by_asc(contact::Column::Name)
        .all(resources.db.as_ref())
        .await
        .map_err(ServiceError::from)?;
    Ok(Json(contacts.into_iter().map(ContactView::from).collect()))
}

#[tracing::instrument(skip(resources, auth, payload), fields(owner_id = %auth.owner_id))]
#[utoipa::path(
    post,
    path = "/api/contacts",
    tag = CONTACTS_TAG,
    operation_id = "Create Contact",
    summary = "Add an emergency contact",
    description = "A contact needs an email address, a phone number or both. The notification \
                   preference may only name channels the contact has a recipient for.",
    security(("User" = [])),
    request_body(content = CreateContactRequest),
    responses(
        (status = 201, description = "Contact created", body = ContactView),
        (status = 400, description = "Invalid contact", body = ApiError),
        (status = 401, description = "Missing or invalid session token", body = ApiError),
    )
)]
pub async fn create_contact(
    Extension(resources): Extension<AppResources>,
    auth: AuthUser,
    Json(payload): Json<CreateContactRequest>,
) -> Result<(StatusCode, Json<ContactView>), ApiError> {
    let valid = validate_contact(payload)?;
    let now = OffsetDateTime::now_utc();

    let txn = resources.db.begin().await.map_err(ServiceError::from)?;
    let created = contact::ActiveModel {
        id: ActiveValue::Set(uuid::Uuid::new_v4().to_string()),
        owner_id: ActiveValue::Set(auth.owner_id.clone()),
        name: ActiveValue::Set(valid.name),
        email: ActiveValue::Set(valid.email),
        phone: ActiveValue::Set(valid.phone),
        notification_preference: ActiveValue::Set(valid.preference),
        deleted: ActiveValue::Set(false),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
    }
    .insert(&txn)
    .await
    .map_err(ServiceError::from)?;
    record_activity(
        &txn,
        NewActivity::new(ActivityAction::CreateContact)
            .owner(&auth.owner_id)
            .contact(&created.id),
        now,
    )
    .await
    .map_err(ServiceError::from)?;
    txn.commit().await.map_err(ServiceError::from)?;

    resources.bus.publish(DomainEvent::ContactUpdated {
        owner_id: auth.owner_id.clone(),
        contact_id: created.id.clone(),
    });
    Ok((StatusCode::CREATED, Json(created.into())))
}

#[tracing::instrument(skip(resources, auth), fields(owner_id = %auth.owner_id))]
#[utoipa::path(
    delete,
    path = "/api/contacts/{id}",
    tag = CONTACTS_TAG,
    operation_id = "Delete Contact",
    summary = "Soft-delete a contact",
    description = "The contact is no longer alerted. Links to events and past notification logs are kept.",
    security(("User" = [])),
    params(("id" = String, Path, description = "Contact id")),
    responses(
        (status = 204, description = "Contact deleted"),
        (status = 403, description = "Contact belongs to another user", body = ApiError),
        (status = 404, description = "Unknown or already deleted contact", body = ApiError),
    )
)]
pub async fn delete_contact(
    Extension(resources): Extension<AppResources>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let now = OffsetDateTime::now_utc();
    let txn = resources.db.begin().await.map_err(ServiceError::from)?;
    let current = contact::Entity::find_by_id(id.clone())
        .one(&txn)
        .await
        .map_err(ServiceError::from)?
        .filter(|c| !c.deleted)
        .ok_or_else(|| ApiError::not_found(format!("contact {id}")))?;
    if current.owner_id != auth.owner_id {
        return Err(ApiError::forbidden("contact belongs to another user"));
    }

    let mut model: contact::ActiveModel = current.into();
    model.deleted = ActiveValue::Set(true);
    model.updated_at = ActiveValue::Set(now);
    model.update(&txn).await.map_err(ServiceError::from)?;
    record_activity(
        &txn,
        NewActivity::new(ActivityAction::DeleteContact)
            .owner(&auth.owner_id)
            .contact(&id),
        now,
    )
    .await
    .map_err(ServiceError::from)?;
    txn.commit().await.map_err(ServiceError::from)?;

    resources.bus.publish(DomainEvent::ContactUpdated {
        owner_id: auth.owner_id,
        contact_id: id,
    });
    Ok(StatusCode::NO_CONTENT)
}
