//! Caller identity and the JSON error body shared by every endpoint.
//!
//! - [`AuthUser`] validates an HS256 session JWT and yields the owner id (`sub`).
//! - [`ServiceAuth`] accepts the static service token used by cron and operators.

use crate::AppResources;
use crate::error::ServiceError;
use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Session token claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Owner id
    pub sub: String,
    pub exp: usize,
}

/// Error body returned by every endpoint except check-in.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code (e.g., "unauthorized", "validation_error")
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ApiError {
    fn new(code: &str, description: Option<String>) -> Self {
        Self {
            error: code.to_string(),
            error_description: description,
        }
    }

    pub fn unauthorized(description: impl Into<String>) -> Self {
        Self::new("unauthorized", Some(description.into()))
    }

    pub fn forbidden(description: impl Into<String>) -> Self {
        Self::new("forbidden", Some(description.into()))
    }

    pub fn not_found(description: impl Into<String>) -> Self {
        Self::new("not_found", Some(description.into()))
    }

    pub fn validation(description: impl Into<String>) -> Self {
        Self::new("validation_error", Some(description.into()))
    }

    pub fn server_error() -> Self {
        Self::new("server_error", None)
    }

    pub fn status_code(&self) -> StatusCode {
        match self.error.as_str() {
            "validation_error" => StatusCode::BAD_REQUEST,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "invalid_transition" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match &err {
            ServiceError::Database(e) => {
                tracing::error!(
                    name = "api.database_error",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    message = "Request failed on a database error"
                );
                ApiError::server_error()
            }
            other => ApiError::new(other.code(), Some(other.to_string())),
        }
    }
}

fn resources(parts: &Parts) -> Result<AppResources, ApiError> {
    parts.extensions.get::<AppResources>().cloned().ok_or_else(|| {
        tracing::error!(
            name = "api.auth.missing_resources",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            message = "AppResources not found in extensions"
        );
        ApiError::server_error()
    })
}

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    match parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        Some(value) => value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::unauthorized("Authorization header must use Bearer scheme")),
        None => Err(ApiError::unauthorized("Missing Authorization header")),
    }
}

/// Issue a session token for `owner_id`; used by operator tooling and tests.
pub fn issue_user_token(
    secret: &str,
    owner_id: &str,
    expires_at: OffsetDateTime,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: owner_id.to_string(),
        exp: expires_at.unix_timestamp().max(0) as usize,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

fn verify_user_token(secret: &str, token: &str) -> Result<String, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| ApiError::unauthorized(format!("Invalid session token: {e}")))?;
    let sub = data.claims.sub.trim();
    if sub.is_empty() {
        return Err(ApiError::unauthorized("Session token has no subject"));
    }
    Ok(sub.to_string())
}

/// Authenticated event owner.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub owner_id: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = resources(parts)?;
        let token = bearer_token(parts)?;
        let owner_id = verify_user_token(&resources.config.auth.jwt_secret, token)?;
        Ok(AuthUser { owner_id })
    }
}

/// Caller presenting the configured service token.
#[derive(Debug, Clone, Copy)]
pub struct ServiceAuth;

/// Constant-time comparison of service tokens.
fn tokens_match(given: &str, expected: &str) -> bool {
    let (a, b) = (given.as_bytes(), expected.as_bytes());
    let mut diff = a.len() ^ b.len();
    for (i, byte) in a.iter().enumerate() {
        diff |= usize::from(byte ^ b.get(i % b.len().max(1)).copied().unwrap_or(0));
    }
    diff == 0
}

impl<S> FromRequestParts<S> for ServiceAuth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = resources(parts)?;
        let token = bearer_token(parts)?;
        if tokens_match(token, &resources.config.auth.service_token) {
            Ok(ServiceAuth)
        } else {
            tracing::warn!(
                name = "api.auth.service_token_rejected",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                message = "Rejected request with wrong service token"
            );
            Err(ApiError::forbidden("Invalid service token"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn api_error_status_codes() {
        assert_eq!(
            ApiError::unauthorized("x").into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::forbidden("x").into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::validation("x").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::server_error().into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn database_errors_do_not_leak_details() {
        let err = ApiError::from(ServiceError::Database(sea_orm::DbErr::Custom(
            "relation \"event\" does not exist".into(),
        )));
        assert_eq!(err.error, "server_error");
        assert!(err.error_description.is_none());
    }

    #[test]
    fn transition_errors_map_to_conflict() {
        let err = ApiError::from(ServiceError::InvalidTransition {
            from: "triggered",
            action: "pause",
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            err.error_description.as_deref(),
            Some("Cannot pause an event that is triggered")
        );
    }

    #[test]
    fn issued_tokens_verify() {
        let exp = OffsetDateTime::now_utc() + time::Duration::hours(1);
        let token = issue_user_token(SECRET, "user-1", exp).unwrap();
        assert_eq!(verify_user_token(SECRET, &token).unwrap(), "user-1");
        assert!(verify_user_token("another-secret-another-secret-xx", &token).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let exp = OffsetDateTime::now_utc() - time::Duration::hours(1);
        let token = issue_user_token(SECRET, "user-1", exp).unwrap();
        assert_eq!(
            verify_user_token(SECRET, &token).unwrap_err().error,
            "unauthorized"
        );
    }

    #[test]
    fn service_token_comparison() {
        assert!(tokens_match("cron-secret", "cron-secret"));
        assert!(!tokens_match("cron-secreT", "cron-secret"));
        assert!(!tokens_match("cron", "cron-secret"));
        assert!(!tokens_match("", "cron-secret"));
    }
}
