//! Middleware for JWT token validation and authentication

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::error;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// Authenticated request context, inserted into request extensions
///
/// Carries the raw token so logout/refresh can blacklist it.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: u64,
}

/// Extract and validate the bearer token from the Authorization header
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    let claims = state
        .jwt_service
        .validate_token(&token)
        .map_err(|_| ApiError::Unauthorized)?;

    // A token given up via logout/refresh stays invalid until its natural
    // expiry
    let is_blacklisted = state
        .jwt_service
        .is_token_blacklisted(&state.redis_pool, &token)
        .await
        .map_err(|e| {
            error!("Failed to check token blacklist: {:#}", e);
            ApiError::Internal(e)
        })?;

    if is_blacklisted {
        return Err(ApiError::Unauthorized);
    }

    req.extensions_mut().insert(AuthContext {
        user_id: claims.sub,
        token,
        expires_at: claims.exp,
    });

    Ok(next.run(req).await)
}
