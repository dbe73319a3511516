use hyper::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not authenticated: {0}")]
    Unauthorized(String),
    #[error("Not permitted: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Cannot {action} an event that is {from}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_error",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::InvalidTransition { .. } => "invalid_transition",
            ServiceError::Database(_) => "server_error",
        }
    }
}

/// Failure of a single outbound delivery attempt.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("{0} channel is not configured")]
    NotConfigured(&'static str),
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("Provider call timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Provider responded with HTTP {status}: {body}")]
    Provider { status: StatusCode, body: String },
    #[error("Provider rejected the message: {0}")]
    Rejected(String),
    #[error("Failed to build message: {0}")]
    Build(String),
}

impl SendError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SendError::Timeout(_) | SendError::Network(_) => true,
            SendError::Provider { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }
}
