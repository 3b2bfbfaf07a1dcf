//! OAuth2 integration for the Twitter (X) provider
//!
//! Twitter's OAuth2 flow requires PKCE. The verifier and CSRF state live in
//! Redis between the redirect and the callback, keyed by the state value.

use anyhow::Result;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl,
    Scope, TokenResponse, TokenUrl, basic::BasicClient,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Social providers the service can authenticate against
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum OAuthProvider {
    Twitter,
}

impl OAuthProvider {
    /// Parse a provider from its URL path segment
    pub fn from_str(provider: &str) -> Option<Self> {
        match provider {
            "twitter" => Some(OAuthProvider::Twitter),
            _ => None,
        }
    }

    /// Get the provider name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Twitter => "twitter",
        }
    }
}

/// OAuth2 configuration for the Twitter provider
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

impl OAuthConfig {
    /// Create a new OAuthConfig from environment variables, None when the
    /// provider is not configured
    ///
    /// # Environment Variables
    /// - `TWITTER_CLIENT_ID` / `TWITTER_CLIENT_SECRET`: app credentials
    /// - `TWITTER_REDIRECT_URL`: the callback URL registered with Twitter
    pub fn twitter_from_env() -> Option<Self> {
        let client_id = std::env::var("TWITTER_CLIENT_ID").ok()?;
        let client_secret = std::env::var("TWITTER_CLIENT_SECRET").ok()?;
        let redirect_url = std::env::var("TWITTER_REDIRECT_URL")
            .unwrap_or_else(|_| "http://localhost:3000/auth/social/twitter/callback".to_string());

        Some(Self {
            client_id,
            client_secret,
            redirect_url,
        })
    }
}

/// OAuth2 client wrapper
#[derive(Clone)]
pub struct OAuthClient {
    client: BasicClient,
}

impl OAuthClient {
    /// Create a new OAuth2 client for Twitter
    pub fn new_twitter(config: &OAuthConfig) -> Result<Self> {
        let client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            AuthUrl::new("https://twitter.com/i/oauth2/authorize".to_string())?,
            Some(TokenUrl::new(
                "https://api.twitter.com/2/oauth2/token".to_string(),
            )?),
        )
        .set_redirect_uri(RedirectUrl::new(config.redirect_url.clone())?);

        Ok(Self { client })
    }

    /// Generate an authorization URL with PKCE
    pub fn generate_auth_url(&self) -> (String, CsrfToken, PkceCodeVerifier) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("users.read".to_string()))
            .add_scope(Scope::new("tweet.read".to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        (auth_url.to_string(), csrf_token, pkce_verifier)
    }

    /// Exchange an authorization code for an access token
    pub async fn exchange_code(
        &self,
        code: String,
        pkce_verifier: PkceCodeVerifier,
    ) -> Result<String> {
        let token_response = self
            .client
            .exchange_code(oauth2::AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(oauth2::reqwest::async_http_client)
            .await?;

        Ok(token_response.access_token().secret().clone())
    }

    /// Fetch the authenticated user's Twitter profile
    pub async fn get_user_profile(&self, access_token: &str) -> Result<OAuthUserProfile> {
        info!("Fetching Twitter user profile");

        let client = reqwest::Client::new();
        let response = client
            .get("https://api.twitter.com/2/users/me")
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Failed to get Twitter user profile: {}",
                response.status()
            ));
        }

        let body: TwitterUserResponse = response.json().await?;
        Ok(OAuthUserProfile {
            id: body.data.id,
            username: body.data.username,
            name: body.data.name,
        })
    }
}

/// Twitter /2/users/me response envelope
#[derive(Debug, Deserialize)]
struct TwitterUserResponse {
    data: TwitterUser,
}

#[derive(Debug, Deserialize)]
struct TwitterUser {
    id: String,
    name: String,
    username: String,
}

/// Profile information returned by the provider
///
/// Twitter's OAuth2 user endpoint does not expose an email address.
#[derive(Debug, Clone)]
pub struct OAuthUserProfile {
    pub id: String,
    pub username: String,
    pub name: String,
}

/// OAuth session data stored in Redis between redirect and callback
#[derive(Debug, Serialize, Deserialize)]
pub struct OAuthSession {
    pub csrf_token: String,
    pub pkce_verifier: String,
    pub provider: OAuthProvider,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!(OAuthProvider::from_str("twitter"), Some(OAuthProvider::Twitter));
        assert_eq!(OAuthProvider::from_str("facebook"), None);
        assert_eq!(OAuthProvider::Twitter.as_str(), "twitter");
    }

    #[test]
    fn test_auth_url_carries_pkce_and_state() {
        let config = OAuthConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            redirect_url: "http://localhost:3000/callback".to_string(),
        };
        let client = OAuthClient::new_twitter(&config).unwrap();

        let (url, csrf, _verifier) = client.generate_auth_url();
        assert!(url.starts_with("https://twitter.com/i/oauth2/authorize"));
        assert!(url.contains("code_challenge="));
        assert!(url.contains(&format!("state={}", csrf.secret())));
        assert!(url.contains("users.read"));
    }
}
