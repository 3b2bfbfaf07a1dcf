//! Custom error types for the authentication service
//!
//! Workflow errors share a single envelope: `{"success": false, "error":
//! {"code", "message", "details"?}}`. `INVALID_VERIFICATION_CODE` is used
//! uniformly for a missing pending record, a wrong code, and the
//! existing-account branch so that none of those cases can be told apart
//! from the outside.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::validation::ValidationErrors;

/// Custom error type for the authentication service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed request body; rendered with the validation envelope
    #[error("Validation failed")]
    Validation(ValidationErrors),

    /// Too many verification-code sends for one email in the trailing hour
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Resend requested before the cooldown elapsed
    #[error("Resend requested during cooldown")]
    ResendCooldown { retry_after: i64 },

    /// No pending registration, wrong code, or existing-account branch
    #[error("Invalid verification code")]
    InvalidVerificationCode,

    /// Verification attempts exhausted for the current code
    #[error("Too many verification attempts")]
    TooManyAttempts,

    /// Login with unknown email or wrong password
    #[error("Invalid credentials")]
    AuthenticationError,

    /// Missing or invalid bearer token
    #[error("Unauthorized")]
    Unauthorized,

    /// Social login with a provider we do not support
    #[error("Unsupported provider")]
    UnsupportedProvider,

    /// Anything else: database, cache, hashing, token issuance
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            // Validation keeps its own envelope
            ApiError::Validation(errors) => return errors.into_response(),
            ApiError::RateLimitExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMIT_EXCEEDED",
                "Too many verification code requests. Please try again later".to_string(),
                None,
            ),
            ApiError::ResendCooldown { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RESEND_COOLDOWN",
                "Please wait before requesting another code".to_string(),
                Some(json!({ "retryAfter": retry_after })),
            ),
            ApiError::InvalidVerificationCode => (
                StatusCode::BAD_REQUEST,
                "INVALID_VERIFICATION_CODE",
                "The verification code is incorrect".to_string(),
                None,
            ),
            ApiError::TooManyAttempts => (
                StatusCode::TOO_MANY_REQUESTS,
                "TOO_MANY_ATTEMPTS",
                "Too many verification attempts. Please try again later".to_string(),
                None,
            ),
            ApiError::AuthenticationError => (
                StatusCode::UNAUTHORIZED,
                "AUTHENTICATION_ERROR",
                "Email or password is incorrect".to_string(),
                None,
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
                None,
            ),
            ApiError::UnsupportedProvider => (
                StatusCode::BAD_REQUEST,
                "UNSUPPORTED_PROVIDER",
                "This authentication provider is not supported".to_string(),
                None,
            ),
            ApiError::Internal(e) => {
                error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let mut error_body = json!({
            "code": code,
            "message": message,
        });
        if let Some(details) = details {
            error_body["details"] = details;
        }

        let body = Json(json!({
            "success": false,
            "error": error_body,
        }));

        (status, body).into_response()
    }
}

/// Type alias for handler results
pub type ApiResult<T> = Result<T, ApiError>;
