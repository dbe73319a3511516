//! Cron and operator endpoints that run check cycles.

use crate::AppResources;
use crate::api::auth::ServiceAuth;
use crate::monitor::{CheckReport, NotifyRequest, ProcessedEvent, run_inactivity_check, run_notify};
use axum::{Extension, Json};
use hyper::StatusCode;
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

pub const CHECKS_TAG: &str = "Checks";

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotifyBody {
    /// Events to process; every event when absent
    #[serde(default)]
    pub event_ids: Option<Vec<String>>,
    /// Notify contacts regardless of status and timer
    #[serde(default)]
    pub force: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckResponse {
    pub success: bool,
    pub processed: Vec<ProcessedEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn respond(result: Result<CheckReport, DbErr>) -> (StatusCode, Json<CheckResponse>) {
    match result {
        Ok(report) => (
            StatusCode::OK,
            Json(CheckResponse {
                success: true,
                processed: report.processed,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!(
                name = "api.checks.failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "Check cycle could not load events"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CheckResponse {
                    success: false,
                    processed: Vec::new(),
                    error: Some("Check cycle failed, see server logs".to_string()),
                }),
            )
        }
    }
}

#[tracing::instrument(skip(resources, _auth, payload))]
#[utoipa::path(
    post,
    path = "/api/notify",
    tag = CHECKS_TAG,
    operation_id = "Notify",
    summary = "Run a notification pass over selected events",
    description = "Without `force` this runs the inactivity check, optionally limited to `eventIds`.\n\n\
                   With `force: true` the contacts of every selected, non-deleted event are alerted \
                   whatever the event's status, mute flag or timer. Forced runs never change status.",
    security(("Service" = [])),
    request_body(content = NotifyBody),
    responses(
        (status = 200, description = "Events processed", body = CheckResponse),
        (status = 401, description = "Missing service token", body = crate::api::auth::ApiError),
        (status = 403, description = "Wrong service token", body = crate::api::auth::ApiError),
        (status = 500, description = "Events could not be loaded", body = CheckResponse),
    )
)]
pub async fn notify(
    Extension(resources): Extension<AppResources>,
    _auth: ServiceAuth,
    Json(payload): Json<NotifyBody>,
) -> (StatusCode, Json<CheckResponse>) {
    let request = NotifyRequest {
        event_ids: payload.event_ids,
        force: payload.force.unwrap_or(false),
    };
    respond(run_notify(&resources, request, OffsetDateTime::now_utc()).await)
}

#[tracing::instrument(skip(resources, _auth))]
#[utoipa::path(
    post,
    path = "/api/inactivity-check",
    tag = CHECKS_TAG,
    operation_id = "Inactivity Check",
    summary = "Evaluate every monitored event",
    description = "Intended for a cron trigger. Scans running, unmuted events, triggers the overdue \
                   ones and alerts their contacts. Owners close to their deadline get a reminder.",
    security(("Service" = [])),
    responses(
        (status = 200, description = "Cycle completed", body = CheckResponse),
        (status = 401, description = "Missing service token", body = crate::api::auth::ApiError),
        (status = 403, description = "Wrong service token", body = crate::api::auth::ApiError),
        (status = 500, description = "Events could not be loaded", body = CheckResponse),
    )
)]
pub async fn inactivity_check(
    Extension(resources): Extension<AppResources>,
    _auth: ServiceAuth,
) -> (StatusCode, Json<CheckResponse>) {
    respond(run_inactivity_check(&resources, OffsetDateTime::now_utc()).await)
}
