//! Event management endpoints and the live domain-event stream.
//!
//! - `GET /api/events` - list the caller's events with their current evaluation
//! - `POST /api/events` - create an event
//! - `GET|PATCH|DELETE /api/events/{id}` - read, edit, soft delete
//! - `POST /api/events/{id}/pause`, `/resume` - status transitions
//! - `GET /api/events/stream` - Server-Sent Events for the caller's own changes

use crate::AppResources;
use crate::activity::{NewActivity, record_activity};
use crate::api::auth::{ApiError, AuthUser};
use crate::domain_events::DomainEvent;
use crate::entity::activity_log::ActivityAction;
use crate::entity::event::{self, EventStatus};
use crate::entity::{contact, event_contact};
use crate::error::ServiceError;
use crate::interval::Interval;
use crate::monitor::overdue::{OverduePolicy, Urgency};
use crate::monitor::status::{StatusAction, apply_user_action, find_owned_event};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::{Extension, Json, extract::Path};
use futures::{Stream, StreamExt};
use hyper::StatusCode;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::convert::Infallible;
use time::OffsetDateTime;
use tokio_stream::wrappers::BroadcastStream;
use utoipa::ToSchema;

pub const EVENTS_TAG: &str = "Events";

const MAX_NAME_LEN: usize = 200;

/// Live evaluation of an event at request time.
#[derive(Debug, Serialize, ToSchema)]
pub struct EvaluationView {
    pub overdue: bool,
    /// Positive while time remains, zero or negative once overdue
    pub time_left_ms: i64,
    pub urgency: Urgency,
    /// e.g. "3 hours left" or "2 days overdue"
    pub display: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventView {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    pub check_in_frequency: String,
    pub missed_checkin_threshold: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub last_check_in: OffsetDateTime,
    pub status: EventStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_trigger_time: Option<OffsetDateTime>,
    pub muted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_content: Option<String>,
    pub contact_ids: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub evaluation: EvaluationView,
}

impl EventView {
    fn new(event: event::Model, contact_ids: Vec<String>, now: OffsetDateTime) -> Self {
        let evaluation = OverduePolicy::for_event(&event).evaluate(event.last_check_in, now);
        Self {
            evaluation: EvaluationView {
                overdue: evaluation.overdue,
                time_left_ms: evaluation.time_left_ms,
                urgency: evaluation.urgency,
                display: evaluation.display(),
            },
            id: event.id,
            name: event.name,
            memo: event.memo,
            check_in_frequency: event.check_in_frequency,
            missed_checkin_threshold: event.missed_checkin_threshold,
            last_check_in: event.last_check_in,
            status: event.status,
            last_trigger_time: event.last_trigger_time,
            muted: event.muted,
            notification_content: event.notification_content,
            contact_ids,
            created_at: event.created_at,
            updated_at: event.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub name: String,
    #[serde(default)]
    pub memo: Option<String>,
    /// Interval such as "1 day" or "12 hours"
    pub check_in_frequency: String,
    /// Consecutive missed intervals tolerated before alerting; defaults to 1
    #[serde(default)]
    pub missed_checkin_threshold: Option<i32>,
    #[serde(default)]
    pub muted: Option<bool>,
    #[serde(default)]
    pub notification_content: Option<String>,
    #[serde(default)]
    pub contact_ids: Vec<String>,
}

/// Absent fields are left unchanged; an empty `memo` or `notificationContent` clears it.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateEventRequest {
    pub name: Option<String>,
    pub memo: Option<String>,
    pub check_in_frequency: Option<String>,
    pub missed_checkin_threshold: Option<i32>,
    pub muted: Option<bool>,
    pub notification_content: Option<String>,
    pub contact_ids: Option<Vec<String>>,
}

fn validate_name(name: &str) -> Result<String, ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::Validation("name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ServiceError::Validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// Normalises the interval ("2 Days" becomes "2 days"); zero-length intervals are refused.
fn validate_frequency(frequency: &str) -> Result<String, ServiceError> {
    let interval: Interval = frequency
        .parse()
        .map_err(|e: crate::interval::InvalidInterval| ServiceError::Validation(e.to_string()))?;
    if interval.as_millis() == 0 {
        return Err(ServiceError::Validation(
            "checkInFrequency must be longer than zero".into(),
        ));
    }
    Ok(interval.to_string())
}

fn validate_threshold(threshold: i32) -> Result<i32, ServiceError> {
    if threshold < 1 {
        return Err(ServiceError::Validation(
            "missedCheckinThreshold must be at least 1".into(),
        ));
    }
    Ok(threshold)
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Deduplicated contact ids, all owned by `owner_id` and not deleted.
async fn owned_contact_ids<C: ConnectionTrait>(
    db: &C,
    owner_id: &str,
    ids: &[String],
) -> Result<Vec<String>, ServiceError> {
    let wanted: BTreeSet<String> = ids.iter().map(|id| id.trim().to_string()).collect();
    if wanted.is_empty() {
        return Ok(Vec::new());
    }
    let found: HashSet<String> = contact::Entity::find()
        .filter(contact::Column::Id.is_in(wanted.iter().cloned()))
        .filter(contact::Column::OwnerId.eq(owner_id))
        .filter(contact::Column::Deleted.eq(false))
        .all(db)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect();
    if let Some(missing) = wanted.iter().find(|id| !found.contains(*id)) {
        return Err(ServiceError::Validation(format!("unknown contact {missing}")));
    }
    Ok(wanted.into_iter().collect())
}

async fn replace_links<C: ConnectionTrait>(
    db: &C,
    event_id: &str,
    contact_ids: &[String],
    now: OffsetDateTime,
) -> Result<(), ServiceError> {
    event_contact::Entity::delete_many()
        .filter(event_contact::Column::EventId.eq(event_id))
        .exec(db)
        .await?;
    if contact_ids.is_empty() {
        return Ok(());
    }
    event_contact::Entity::insert_many(contact_ids.iter().map(|contact_id| {
        event_contact::ActiveModel {
            event_id: ActiveValue::Set(event_id.to_string()),
            contact_id: ActiveValue::Set(contact_id.clone()),
            created_at: ActiveValue::Set(now),
        }
    }))
    .exec_without_returning(db)
    .await?;
    Ok(())
}

/// Live contact ids linked to each of `event_ids`.
async fn linked_contacts<C: ConnectionTrait>(
    db: &C,
    owner_id: &str,
    event_ids: Vec<String>,
) -> Result<HashMap<String, Vec<String>>, ServiceError> {
    let live: HashSet<String> = contact::Entity::find()
        .filter(contact::Column::OwnerId.eq(owner_id))
        .filter(contact::Column::Deleted.eq(false))
        .all(db)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect();
    let mut links: HashMap<String, Vec<String>> = HashMap::new();
    for link in event_contact::Entity::find()
        .filter(event_contact::Column::EventId.is_in(event_ids))
        .order_by_asc(event_contact::Column::ContactId)
        .all(db)
        .await?
    {
        if live.contains(&link.contact_id) {
            links.entry(link.event_id).or_default().push(link.contact_id);
        }
    }
    Ok(links)
}

async fn view_of<C: ConnectionTrait>(
    db: &C,
    event: event::Model,
    now: OffsetDateTime,
) -> Result<EventView, ServiceError> {
    let mut links = linked_contacts(db, &event.owner_id, vec![event.id.clone()]).await?;
    let contact_ids = links.remove(&event.id).unwrap_or_default();
    Ok(EventView::new(event, contact_ids, now))
}

#[tracing::instrument(skip(resources, auth), fields(owner_id = %auth.owner_id))]
#[utoipa::path(
    get,
    path = "/api/events",
    tag = EVENTS_TAG,
    operation_id = "List Events",
    summary = "List the caller's events",
    description = "Returns every non-deleted event of the caller, each with its evaluation at request time.",
    security(("User" = [])),
    responses(
        (status = 200, description = "Events", body = Vec<EventView>),
        (status = 401, description = "Missing or invalid session token", body = ApiError),
    )
)]
pub async fn list_events(
    Extension(resources): Extension<AppResources>,
    auth: AuthUser,
) -> Result<Json<Vec<EventView>>, ApiError> {
    let db = resources.db.as_ref();
    let now = OffsetDateTime::now_utc();
    let events = event::Entity::find()
        .filter(event::Column::OwnerId.eq(auth.owner_id.as_str()))
        .filter(event::Column::Deleted.eq(false))
        .order_by_asc(event::Column::CreatedAt)
        .all(db)
        .await
        .map_err(ServiceError::from)?;
    let mut links = linked_contacts(
        db,
        &auth.owner_id,
        events.iter().map(|e| e.id.clone()).collect(),
    )
    .await?;

    Ok(Json(
        events
            .into_iter()
            .map(|e| {
                let contact_ids = links.remove(&e.id).unwrap_or_default();
                EventView::new(e, contact_ids, now)
            })
            .collect(),
    ))
}

#[tracing::instrument(skip(resources, auth, payload), fields(owner_id = %auth.owner_id))]
#[utoipa::path(
    post,
    path = "/api/events",
    tag = EVENTS_TAG,
    operation_id = "Create Event",
    summary = "Create a check-in event",
    description = "Creates a running event whose timer starts now. `checkInFrequency` must be an \
                   interval such as \"1 day\"; every id in `contactIds` must be one of the caller's contacts.",
    security(("User" = [])),
    request_body(content = CreateEventRequest),
    responses(
        (status = 201, description = "Event created", body = EventView),
        (status = 400, description = "Invalid event", body = ApiError),
        (status = 401, description = "Missing or invalid session token", body = ApiError),
    )
)]
pub async fn create_event(
    Extension(resources): Extension<AppResources>,
    auth: AuthUser,
    Json(payload): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventView>), ApiError> {
    let name = validate_name(&payload.name)?;
    let frequency = validate_frequency(&payload.check_in_frequency)?;
    let threshold = validate_threshold(payload.missed_checkin_threshold.unwrap_or(1))?;
    let now = OffsetDateTime::now_utc();

    let txn = resources.db.begin().await.map_err(ServiceError::from)?;
    let contact_ids = owned_contact_ids(&txn, &auth.owner_id, &payload.contact_ids).await?;
    let created = event::ActiveModel {
        id: ActiveValue::Set(uuid::Uuid::new_v4().to_string()),
        owner_id: ActiveValue::Set(auth.owner_id.clone()),
        name: ActiveValue::Set(name),
        memo: ActiveValue::Set(optional_text(payload.memo)),
        check_in_frequency: ActiveValue::Set(frequency),
        missed_checkin_threshold: ActiveValue::Set(threshold),
        last_check_in: ActiveValue::Set(now),
        status: ActiveValue::Set(EventStatus::Running),
        last_trigger_time: ActiveValue::Set(None),
        last_reminder_at: ActiveValue::Set(None),
        muted: ActiveValue::Set(payload.muted.unwrap_or(false)),
        notification_content: ActiveValue::Set(optional_text(payload.notification_content)),
        deleted: ActiveValue::Set(false),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
    }
    .insert(&txn)
    .await
    .map_err(ServiceError::from)?;
    replace_links(&txn, &created.id, &contact_ids, now).await?;
    record_activity(
        &txn,
        NewActivity::new(ActivityAction::CreateEvent)
            .owner(&auth.owner_id)
            .event(&created.id),
        now,
    )
    .await
    .map_err(ServiceError::from)?;
    txn.commit().await.map_err(ServiceError::from)?;

    tracing::info!(
        name = "api.events.created",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        event_id = %created.id,
        contacts = contact_ids.len(),
        message = "Event created"
    );
    resources.bus.publish(DomainEvent::EventStatusChanged {
        owner_id: auth.owner_id.clone(),
        event_id: created.id.clone(),
        status: created.status,
    });
    Ok((StatusCode::CREATED, Json(EventView::new(created, contact_ids, now))))
}

#[tracing::instrument(skip(resources, auth), fields(owner_id = %auth.owner_id))]
#[utoipa::path(
    get,
    path = "/api/events/{id}",
    tag = EVENTS_TAG,
    operation_id = "Get Event",
    summary = "Get one event",
    security(("User" = [])),
    params(("id" = String, Path, description = "Event id")),
    responses(
        (status = 200, description = "Event", body = EventView),
        (status = 403, description = "Event belongs to another user", body = ApiError),
        (status = 404, description = "Unknown or deleted event", body = ApiError),
    )
)]
pub async fn get_event(
    Extension(resources): Extension<AppResources>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<EventView>, ApiError> {
    let db = resources.db.as_ref();
    let event = find_owned_event(db, &auth.owner_id, &id).await?;
    Ok(Json(view_of(db, event, OffsetDateTime::now_utc()).await?))
}

#[tracing::instrument(skip(resources, auth, payload), fields(owner_id = %auth.owner_id))]
#[utoipa::path(
    patch,
    path = "/api/events/{id}",
    tag = EVENTS_TAG,
    operation_id = "Update Event",
    summary = "Edit an event",
    description = "Updates any subset of name, memo, frequency, threshold, mute flag, notification \
                   content and linked contacts. Status and timer are not affected.",
    security(("User" = [])),
    params(("id" = String, Path, description = "Event id")),
    request_body(content = UpdateEventRequest),
    responses(
        (status = 200, description = "Updated event", body = EventView),
        (status = 400, description = "Invalid change", body = ApiError),
        (status = 403, description = "Event belongs to another user", body = ApiError),
        (status = 404, description = "Unknown or deleted event", body = ApiError),
    )
)]
pub async fn update_event(
    Extension(resources): Extension<AppResources>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateEventRequest>,
) -> Result<Json<EventView>, ApiError> {
    let now = OffsetDateTime::now_utc();
    let txn = resources.db.begin().await.map_err(ServiceError::from)?;
    let current = find_owned_event(&txn, &auth.owner_id, &id).await?;

    let mut changed: Vec<&'static str> = Vec::new();
    let mut model: event::ActiveModel = current.into();
    if let Some(name) = payload.name {
        model.name = ActiveValue::Set(validate_name(&name)?);
        changed.push("name");
    }
    if let Some(memo) = payload.memo {
        model.memo = ActiveValue::Set(optional_text(Some(memo)));
        changed.push("memo");
    }
    if let Some(frequency) = payload.check_in_frequency {
        model.check_in_frequency = ActiveValue::Set(validate_frequency(&frequency)?);
        changed.push("check_in_frequency");
    }
    if let Some(threshold) = payload.missed_checkin_threshold {
        model.missed_checkin_threshold = ActiveValue::Set(validate_threshold(threshold)?);
        changed.push("missed_checkin_threshold");
    }
    if let Some(muted) = payload.muted {
        model.muted = ActiveValue::Set(muted);
        changed.push("muted");
    }
    if let Some(content) = payload.notification_content {
        model.notification_content = ActiveValue::Set(optional_text(Some(content)));
        changed.push("notification_content");
    }
    if let Some(ids) = payload.contact_ids {
        let contact_ids = owned_contact_ids(&txn, &auth.owner_id, &ids).await?;
        replace_links(&txn, &id, &contact_ids, now).await?;
        changed.push("contacts");
    }
    model.updated_at = ActiveValue::Set(now);
    let updated = model.update(&txn).await.map_err(ServiceError::from)?;

    let activity = changed.iter().fold(
        NewActivity::new(ActivityAction::UpdateEvent)
            .owner(&auth.owner_id)
            .event(&id),
        |entry, field| entry.detail(field, "changed"),
    );
    record_activity(&txn, activity, now)
        .await
        .map_err(ServiceError::from)?;
    let view = view_of(&txn, updated, now).await?;
    txn.commit().await.map_err(ServiceError::from)?;

    Ok(Json(view))
}

async fn transition(
    resources: &AppResources,
    auth: &AuthUser,
    id: &str,
    action: StatusAction,
) -> Result<event::Model, ApiError> {
    Ok(apply_user_action(
        resources.db.as_ref(),
        &resources.bus,
        &auth.owner_id,
        id,
        action,
        OffsetDateTime::now_utc(),
    )
    .await?)
}

#[tracing::instrument(skip(resources, auth), fields(owner_id = %auth.owner_id))]
#[utoipa::path(
    post,
    path = "/api/events/{id}/pause",
    tag = EVENTS_TAG,
    operation_id = "Pause Event",
    summary = "Pause monitoring of a running event",
    security(("User" = [])),
    params(("id" = String, Path, description = "Event id")),
    responses(
        (status = 200, description = "Event paused", body = EventView),
        (status = 404, description = "Unknown or deleted event", body = ApiError),
        (status = 409, description = "Event is not running", body = ApiError),
    )
)]
pub async fn pause_event(
    Extension(resources): Extension<AppResources>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<EventView>, ApiError> {
    let event = transition(&resources, &auth, &id, StatusAction::Pause).await?;
    Ok(Json(
        view_of(resources.db.as_ref(), event, OffsetDateTime::now_utc()).await?,
    ))
}

#[tracing::instrument(skip(resources, auth), fields(owner_id = %auth.owner_id))]
#[utoipa::path(
    post,
    path = "/api/events/{id}/resume",
    tag = EVENTS_TAG,
    operation_id = "Resume Event",
    summary = "Resume monitoring of a paused event",
    security(("User" = [])),
    params(("id" = String, Path, description = "Event id")),
    responses(
        (status = 200, description = "Event running again", body = EventView),
        (status = 404, description = "Unknown or deleted event", body = ApiError),
        (status = 409, description = "Event is not paused", body = ApiError),
    )
)]
pub async fn resume_event(
    Extension(resources): Extension<AppResources>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<EventView>, ApiError> {
    let event = transition(&resources, &auth, &id, StatusAction::Resume).await?;
    Ok(Json(
        view_of(resources.db.as_ref(), event, OffsetDateTime::now_utc()).await?,
    ))
}

#[tracing::instrument(skip(resources, auth), fields(owner_id = %auth.owner_id))]
#[utoipa::path(
    delete,
    path = "/api/events/{id}",
    tag = EVENTS_TAG,
    operation_id = "Delete Event",
    summary = "Soft-delete an event",
    description = "The event stops being monitored. Its contact links and logs are kept.",
    security(("User" = [])),
    params(("id" = String, Path, description = "Event id")),
    responses(
        (status = 204, description = "Event deleted"),
        (status = 403, description = "Event belongs to another user", body = ApiError),
        (status = 404, description = "Unknown or already deleted event", body = ApiError),
    )
)]
pub async fn delete_event(
    Extension(resources): Extension<AppResources>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    transition(&resources, &auth, &id, StatusAction::Delete).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The caller's domain events as SSE frames; lagged messages are dropped.
fn owner_stream(
    resources: &AppResources,
    owner_id: String,
) -> impl Stream<Item = Result<SseEvent, Infallible>> + use<> {
    BroadcastStream::new(resources.bus.subscribe()).filter_map(move |received| {
        let frame = match received {
            Ok(event) if event.owner_id() == owner_id => {
                SseEvent::default().event(event.kind()).json_data(&event).ok()
            }
            _ => None,
        };
        futures::future::ready(frame.map(Ok))
    })
}

#[tracing::instrument(skip(resources, auth), fields(owner_id = %auth.owner_id))]
#[utoipa::path(
    get,
    path = "/api/events/stream",
    tag = EVENTS_TAG,
    operation_id = "Stream Events",
    summary = "Live updates for the caller's events and contacts",
    description = "Server-Sent Events. The SSE `event` field is the change kind (`event_triggered`, \
                   `check_in_performed`, `event_status_changed`, `contact_updated`); the data is the \
                   change as JSON.",
    security(("User" = [])),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream", body = String),
        (status = 401, description = "Missing or invalid session token", body = ApiError),
    )
)]
pub async fn stream_events(
    Extension(resources): Extension<AppResources>,
    auth: AuthUser,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    Sse::new(owner_stream(&resources, auth.owner_id)).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_is_normalised() {
        assert_eq!(validate_frequency("2 Days").unwrap(), "2 days");
        assert_eq!(validate_frequency("1 hours").unwrap(), "1 hour");
    }

    #[test]
    fn bad_frequencies_are_rejected() {
        assert!(validate_frequency("daily").is_err());
        assert!(validate_frequency("0 days").is_err());
    }

    #[test]
    fn names_are_trimmed_and_required() {
        assert_eq!(validate_name("  Walk ").unwrap(), "Walk");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn threshold_must_be_positive() {
        assert!(validate_threshold(0).is_err());
        assert_eq!(validate_threshold(3).unwrap(), 3);
    }

    #[test]
    fn blank_text_clears() {
        assert_eq!(optional_text(Some("  ".into())), None);
        assert_eq!(optional_text(Some(" hi ".into())), Some("hi".into()));
        assert_eq!(optional_text(None), None);
    }
}
