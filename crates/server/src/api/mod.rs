//! HTTP API.
//!
//! - `checkin` - owner check-ins (/api/checkin)
//! - `events` - event management and the live stream (/api/events/*)
//! - `contacts` - emergency contacts (/api/contacts/*)
//! - `profile` - the owner's own targets (/api/profile)
//! - `notify` - cron and operator check cycles (/api/notify, /api/inactivity-check)
//! - `test_notification` - test messages (/api/test-notification)
//! - `health` - health check (/healthz)
//! - `auth` - identity extractors and the error body
//! - `openapi` - OpenAPI/Utoipa configuration

pub mod auth;
pub mod checkin;
pub mod contacts;
pub mod events;
pub mod health;
pub mod notify;
pub mod openapi;
pub mod profile;
pub mod test_notification;

use crate::AppResources;
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// All routes with resources and middleware attached; docs are served at `/api-docs`.
pub fn build_router(resources: AppResources) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .routes(routes!(health::health))
        .routes(routes!(checkin::checkin))
        .routes(routes!(notify::notify))
        .routes(routes!(notify::inactivity_check))
        .routes(routes!(test_notification::test_notification))
        .routes(routes!(events::list_events, events::create_event))
        .routes(routes!(events::stream_events))
        .routes(routes!(
            events::get_event,
            events::update_event,
            events::delete_event
        ))
        .routes(routes!(events::pause_event))
        .routes(routes!(events::resume_event))
        .routes(routes!(contacts::list_contacts, contacts::create_contact))
        .routes(routes!(contacts::delete_contact))
        .routes(routes!(profile::get_profile, profile::update_profile))
        .layer(axum::Extension(resources))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(app_resources))]
pub async fn start_webserver(app_resources: AppResources) -> color_eyre::Result<()> {
    let addr = app_resources.config.listen_addr.clone();
    let router = build_router(app_resources);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        name = "api.server.listening",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        addr = %addr,
        message = "Server running"
    );
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
