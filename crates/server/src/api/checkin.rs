//! Check-in endpoint.

use crate::AppResources;
use crate::api::auth::{ApiError, AuthUser};
use crate::error::ServiceError;
use crate::monitor::check_in;
use axum::{Extension, Json};
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

pub const CHECKIN_TAG: &str = "Check-in";

/// Shown to clients when the check-in failed for a reason they cannot fix.
pub const UNAVAILABLE_MESSAGE: &str = "Check-in service unavailable, try again later";

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    pub event_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckInResponse {
    pub success: bool,
    /// Stored check-in time
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckInResponse {
    fn failed(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                success: false,
                timestamp: None,
                error: Some(error.into()),
            }),
        )
    }
}

#[tracing::instrument(skip(resources, auth, payload), fields(event_id = %payload.event_id))]
#[utoipa::path(
    post,
    path = "/api/checkin",
    tag = CHECKIN_TAG,
    operation_id = "Check In",
    summary = "Reset an event's inactivity timer",
    description = "Records a check-in for one of the caller's events. The event returns to `running` \
                   and its timer restarts from now. Repeated check-ins are fine; each one simply \
                   resets the timer again.",
    security(("User" = [])),
    request_body(content = CheckInRequest),
    responses(
        (status = 200, description = "Check-in recorded", body = CheckInResponse),
        (status = 400, description = "Missing event id", body = CheckInResponse),
        (status = 401, description = "Missing or invalid session token", body = CheckInResponse),
        (status = 403, description = "Event belongs to another user", body = CheckInResponse),
        (status = 404, description = "Unknown or deleted event", body = CheckInResponse),
        (status = 500, description = "Check-in service unavailable", body = CheckInResponse),
    )
)]
pub async fn checkin(
    Extension(resources): Extension<AppResources>,
    auth: Result<AuthUser, ApiError>,
    Json(payload): Json<CheckInRequest>,
) -> (StatusCode, Json<CheckInResponse>) {
    let user = match auth {
        Ok(user) => user,
        Err(e) => {
            let status = e.status_code();
            return CheckInResponse::failed(
                status,
                e.error_description.unwrap_or_else(|| e.error.clone()),
            );
        }
    };

    let event_id = payload.event_id.trim();
    if event_id.is_empty() {
        return CheckInResponse::failed(StatusCode::BAD_REQUEST, "eventId is required");
    }

    match check_in(
        resources.db.as_ref(),
        &resources.bus,
        &user.owner_id,
        event_id,
        OffsetDateTime::now_utc(),
    )
    .await
    {
        Ok(event) => (
            StatusCode::OK,
            Json(CheckInResponse {
                success: true,
                timestamp: Some(event.last_check_in),
                error: None,
            }),
        ),
        Err(ServiceError::Database(e)) => {
            tracing::error!(
                name = "api.checkin.failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                event_id = %event_id,
                message = "Check-in failed on a database error"
            );
            CheckInResponse::failed(StatusCode::INTERNAL_SERVER_ERROR, UNAVAILABLE_MESSAGE)
        }
        Err(e) => CheckInResponse::failed(e.status_code(), e.to_string()),
    }
}
