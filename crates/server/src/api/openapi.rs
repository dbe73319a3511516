//! OpenAPI/Utoipa configuration.

use crate::api::checkin::CHECKIN_TAG;
use crate::api::contacts::CONTACTS_TAG;
use crate::api::events::EVENTS_TAG;
use crate::api::health::MISC_TAG;
use crate::api::notify::CHECKS_TAG;
use crate::api::profile::PROFILE_TAG;
use crate::api::test_notification::TEST_NOTIFICATION_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    #[tracing::instrument(skip(self, openapi))]
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let user = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("JWT")
                .description(Some(
                    "HS256 session token whose `sub` claim is the event owner's id.",
                ))
                .build();
            components.add_security_scheme("User", SecurityScheme::Http(user));

            let service = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .description(Some(
                    "Static service token for the cron trigger and operator endpoints.",
                ))
                .build();
            components.add_security_scheme("Service", SecurityScheme::Http(service));
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "StayConnected API",
        version = "1.0.0",
        description = "Check-in service that alerts emergency contacts when an owner misses a check-in."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = CHECKIN_TAG, description = "Owner check-ins"),
        (name = EVENTS_TAG, description = "Check-in event management"),
        (name = CONTACTS_TAG, description = "Emergency contacts"),
        (name = PROFILE_TAG, description = "Owner notification profile"),
        (name = CHECKS_TAG, description = "Cron and operator check cycles"),
        (name = TEST_NOTIFICATION_TAG, description = "Test messages to contacts")
    )
)]
pub struct ApiDoc;
