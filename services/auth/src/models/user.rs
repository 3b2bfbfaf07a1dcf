//! User model and related functionality

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// User entity
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Twitter (X) account id, set for socially linked accounts
    pub twitter_id: Option<String>,
    /// None for social-only accounts that never set a password
    pub password_hash: Option<String>,
    pub nickname: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New user creation payload
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub twitter_id: Option<String>,
    pub password_hash: Option<String>,
    pub nickname: String,
}
