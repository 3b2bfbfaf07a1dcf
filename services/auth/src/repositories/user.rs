//! User repository for database operations

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::code::verify_secret;
use crate::models::{NewUser, User, default_settings};
use crate::registration::UserDirectory;

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a user by email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, twitter_id, password_hash, nickname, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find a user by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, twitter_id, password_hash, nickname, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Verify a user's password
    ///
    /// Social-only accounts have no password and never match.
    pub async fn verify_password(&self, user: &User, password: &str) -> Result<bool> {
        match &user.password_hash {
            Some(hash) => verify_secret(password, hash),
            None => Ok(false),
        }
    }

    /// Find a user for a social callback, creating or linking as needed
    ///
    /// Precedence: an account already linked to this provider id wins;
    /// otherwise an account with the same email gets the provider id linked
    /// onto it; otherwise a fresh user (plus default settings) is created.
    /// Runs in a single transaction.
    pub async fn find_or_create_social(
        &self,
        twitter_id: &str,
        email: &str,
        nickname: &str,
    ) -> Result<User> {
        let mut tx = self.pool.begin().await?;

        let linked = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, twitter_id, password_hash, nickname, created_at, updated_at
            FROM users
            WHERE twitter_id = $1
            "#,
        )
        .bind(twitter_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(user) = linked {
            tx.commit().await?;
            return Ok(user);
        }

        let by_email = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, twitter_id, password_hash, nickname, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&mut *tx)
        .await?;

        let user = if let Some(existing) = by_email {
            let user = sqlx::query_as::<_, User>(
                r#"
                UPDATE users SET twitter_id = $1, updated_at = now()
                WHERE id = $2
                RETURNING id, email, twitter_id, password_hash, nickname, created_at, updated_at
                "#,
            )
            .bind(twitter_id)
            .bind(existing.id)
            .fetch_one(&mut *tx)
            .await?;
            info!("Linked Twitter account to user {}", existing.id);
            user
        } else {
            let new_user = NewUser {
                email: email.to_string(),
                twitter_id: Some(twitter_id.to_string()),
                // Social-only accounts carry no password
                password_hash: None,
                nickname: nickname.to_string(),
            };
            let user = insert_user_with_settings(&mut tx, &new_user).await?;
            info!("Created user {} from social login", user.id);
            user
        };

        tx.commit().await?;
        Ok(user)
    }
}

/// Insert a user row and its default settings row inside the given
/// transaction; neither is kept unless both succeed
async fn insert_user_with_settings(
    tx: &mut Transaction<'_, Postgres>,
    new_user: &NewUser,
) -> Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, twitter_id, password_hash, nickname)
        VALUES ($1, $2, $3, $4)
        RETURNING id, email, twitter_id, password_hash, nickname, created_at, updated_at
        "#,
    )
    .bind(&new_user.email)
    .bind(&new_user.twitter_id)
    .bind(&new_user.password_hash)
    .bind(&new_user.nickname)
    .fetch_one(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO user_settings (user_id, settings_json)
        VALUES ($1, $2)
        "#,
    )
    .bind(user.id)
    .bind(default_settings())
    .execute(&mut **tx)
    .await?;

    Ok(user)
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn email_exists(&self, email: &str) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1) AS present")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("present"))
    }

    async fn create_with_settings(&self, new_user: &NewUser) -> Result<User> {
        info!("Creating user for {}", new_user.email);

        let mut tx = self.pool.begin().await?;
        let user = insert_user_with_settings(&mut tx, new_user).await?;
        tx.commit().await?;

        Ok(user)
    }
}
