//! Authentication service routes

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    AppState,
    error::{ApiError, ApiResult},
    middleware::{AuthContext, auth_middleware},
    models::User,
    oauth::{OAuthProvider, OAuthSession},
    validation::{
        ValidationErrors, validate_email, validate_resend_code, validate_send_code,
        validate_verify_code,
    },
};

/// How long the PKCE/CSRF state of a social login survives between the
/// redirect and the callback
const OAUTH_SESSION_TTL_SECS: u64 = 600;

/// Request to start a registration
#[derive(Deserialize)]
pub struct SendCodeRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub nickname: String,
}

/// Request to resend the verification code
#[derive(Deserialize)]
pub struct ResendCodeRequest {
    #[serde(default)]
    pub email: String,
}

/// Request to verify a registration code
#[derive(Deserialize)]
pub struct VerifyCodeRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub code: String,
}

/// Request for user login
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Query parameters of the social callback
#[derive(Deserialize)]
pub struct SocialCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// Send/resend response payload
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSentData {
    pub message: String,
    pub email: String,
    pub expires_in: u64,
}

/// Public user fields
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub id: Uuid,
    pub email: String,
    pub nickname: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserData {
    fn public(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            nickname: user.nickname.clone(),
            created_at: user.created_at,
            updated_at: None,
        }
    }

    fn detailed(user: &User) -> Self {
        Self {
            updated_at: Some(user.updated_at),
            ..Self::public(user)
        }
    }
}

/// Session response payload (register verify and login)
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub user: UserData,
    pub access_token: String,
}

/// Wrap payload data in the success envelope
fn success_response<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "data": data,
        "meta": { "timestamp": Utc::now().to_rfc3339() },
    }))
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
        .route("/auth/refresh", post(refresh))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register/send-code", post(send_code))
        .route("/auth/register/resend-code", post(resend_code))
        .route("/auth/register/verify", post(verify_code))
        .route("/auth/login", post(login))
        .route("/auth/social/:provider/redirect", get(social_redirect))
        .route("/auth/social/:provider/callback", get(social_callback))
        .merge(protected)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

/// Start a registration by emailing a verification code
pub async fn send_code(
    State(state): State<AppState>,
    Json(payload): Json<SendCodeRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_send_code(&payload.email, &payload.password, &payload.nickname)?;

    let sent = state
        .registration
        .send_code(&payload.email, &payload.password, &payload.nickname)
        .await?;

    Ok((
        StatusCode::OK,
        success_response(CodeSentData {
            message: "Verification code sent".to_string(),
            email: sent.email,
            expires_in: sent.expires_in,
        }),
    ))
}

/// Resend the verification code for an in-flight registration
pub async fn resend_code(
    State(state): State<AppState>,
    Json(payload): Json<ResendCodeRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_resend_code(&payload.email)?;

    let sent = state.registration.resend_code(&payload.email).await?;

    Ok((
        StatusCode::OK,
        success_response(CodeSentData {
            message: "Verification code resent".to_string(),
            email: sent.email,
            expires_in: sent.expires_in,
        }),
    ))
}

/// Complete a registration with the emailed code
pub async fn verify_code(
    State(state): State<AppState>,
    Json(payload): Json<VerifyCodeRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_verify_code(&payload.email, &payload.code)?;

    let completed = state
        .registration
        .verify_code(&payload.email, &payload.code)
        .await?;

    Ok((
        StatusCode::CREATED,
        success_response(SessionData {
            user: UserData::public(&completed.user),
            access_token: completed.access_token,
        }),
    ))
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut errors = ValidationErrors::default();
    if let Err(message) = validate_email(&payload.email) {
        errors.add("email", message);
    }
    if payload.password.is_empty() {
        errors.add("password", "Password is required".to_string());
    }
    errors.into_result()?;

    info!("Login attempt for {}", payload.email);

    let user = state
        .user_repository
        .find_by_email(&payload.email)
        .await?
        .ok_or(ApiError::AuthenticationError)?;

    let password_matches = state
        .user_repository
        .verify_password(&user, &payload.password)
        .await?;
    if !password_matches {
        return Err(ApiError::AuthenticationError);
    }

    let access_token = state.jwt_service.generate_token(&user)?;

    Ok((
        StatusCode::OK,
        success_response(SessionData {
            user: UserData::public(&user),
            access_token,
        }),
    ))
}

/// Return the authenticated user's profile
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .user_repository
        .find_by_id(auth.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    Ok((
        StatusCode::OK,
        success_response(json!({ "user": UserData::detailed(&user) })),
    ))
}

/// Invalidate the presented token
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<impl IntoResponse> {
    state
        .jwt_service
        .blacklist_token(&state.redis_pool, &auth.token, auth.expires_at)
        .await?;

    Ok((
        StatusCode::OK,
        success_response(json!({ "message": "Logged out successfully" })),
    ))
}

/// Exchange the presented token for a fresh one
pub async fn refresh(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .user_repository
        .find_by_id(auth.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // The old token is given up before the new one is handed out
    state
        .jwt_service
        .blacklist_token(&state.redis_pool, &auth.token, auth.expires_at)
        .await?;

    let access_token = state.jwt_service.generate_token(&user)?;

    Ok((
        StatusCode::OK,
        success_response(json!({
            "accessToken": access_token,
            "expiresIn": state.jwt_service.token_expiry(),
        })),
    ))
}

/// Redirect the browser to the social provider's consent page
pub async fn social_redirect(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> ApiResult<Response> {
    let provider = OAuthProvider::from_str(&provider).ok_or(ApiError::UnsupportedProvider)?;
    let oauth_client = state
        .oauth_client
        .as_ref()
        .ok_or(ApiError::UnsupportedProvider)?;

    let (auth_url, csrf_token, pkce_verifier) = oauth_client.generate_auth_url();

    let session = OAuthSession {
        csrf_token: csrf_token.secret().clone(),
        pkce_verifier: pkce_verifier.secret().clone(),
        provider,
        created_at: Utc::now().timestamp(),
    };
    let session_json = serde_json::to_string(&session)
        .map_err(|e| anyhow::anyhow!("Failed to serialize OAuth session: {}", e))?;
    state
        .redis_pool
        .set(
            &format!("oauth_session:{}", csrf_token.secret()),
            &session_json,
            Some(OAUTH_SESSION_TTL_SECS),
        )
        .await?;

    Ok(Redirect::to(&auth_url).into_response())
}

/// Handle the social provider's callback: create or link the user, then
/// bounce back to the frontend with a session token
pub async fn social_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<SocialCallbackQuery>,
) -> ApiResult<Response> {
    let provider = OAuthProvider::from_str(&provider).ok_or(ApiError::UnsupportedProvider)?;

    match complete_social_login(&state, provider, query).await {
        Ok(token) => {
            let url = format!(
                "{}/auth/social/callback?token={}&provider={}",
                state.frontend_url,
                token,
                provider.as_str()
            );
            Ok(Redirect::to(&url).into_response())
        }
        Err(e) => {
            // Social failures send the browser back to the login page
            // instead of stranding it on an API error body
            error!("Social authentication failed: {:#}", e);
            let url = format!("{}/login?error=social_auth_failed", state.frontend_url);
            Ok(Redirect::to(&url).into_response())
        }
    }
}

async fn complete_social_login(
    state: &AppState,
    provider: OAuthProvider,
    query: SocialCallbackQuery,
) -> anyhow::Result<String> {
    let oauth_client = state
        .oauth_client
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("{} provider not configured", provider.as_str()))?;

    let code = query
        .code
        .ok_or_else(|| anyhow::anyhow!("Callback missing authorization code"))?;
    let oauth_state = query
        .state
        .ok_or_else(|| anyhow::anyhow!("Callback missing state parameter"))?;

    let session_key = format!("oauth_session:{}", oauth_state);
    let session_json = state
        .redis_pool
        .get(&session_key)
        .await?
        .ok_or_else(|| anyhow::anyhow!("OAuth session expired or unknown"))?;
    state.redis_pool.delete(&session_key).await?;

    let session: OAuthSession = serde_json::from_str(&session_json)?;
    if session.csrf_token != oauth_state {
        anyhow::bail!("OAuth state mismatch");
    }

    let access_token = oauth_client
        .exchange_code(code, oauth2::PkceCodeVerifier::new(session.pkce_verifier))
        .await?;
    let profile = oauth_client.get_user_profile(&access_token).await?;

    if profile.id.is_empty() {
        anyhow::bail!("Provider returned an empty user id");
    }

    // Twitter does not hand out the email, so linked accounts get a
    // synthetic address under a reserved domain
    let email = format!("twitter_{}@social.witlt.local", profile.id);
    let nickname = if profile.username.is_empty() {
        profile.name.clone()
    } else {
        profile.username.clone()
    };
    let nickname: String = nickname.chars().take(10).collect();
    let nickname = if nickname.is_empty() {
        "user".to_string()
    } else {
        nickname
    };

    let user = state
        .user_repository
        .find_or_create_social(&profile.id, &email, &nickname)
        .await?;

    let token = state.jwt_service.generate_token(&user)?;
    Ok(token)
}
