use anyhow::Result;
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

mod code;
mod config;
mod error;
mod jwt;
mod mailer;
mod middleware;
mod models;
mod oauth;
mod registration;
mod repositories;
mod routes;
mod store;
mod validation;

use common::cache::RedisPool;
use common::error::DatabaseError;

use crate::config::RegistrationConfig;
use crate::jwt::JwtService;
use crate::mailer::{SmtpConfig, SmtpMailer};
use crate::oauth::{OAuthClient, OAuthConfig};
use crate::registration::RegistrationService;
use crate::repositories::UserRepository;
use crate::store::RedisRegistrationStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub redis_pool: RedisPool,
    pub jwt_service: JwtService,
    pub user_repository: UserRepository,
    pub registration: RegistrationService,
    pub oauth_client: Option<OAuthClient>,
    pub frontend_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting authentication service");

    // Initialize database connection pool
    let db_config = common::database::DatabaseConfig::from_env()?;
    let pool = common::database::init_pool(&db_config).await?;

    // Check database connectivity
    if common::database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    // Apply pending migrations
    sqlx::migrate!()
        .run(&pool)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

    // Initialize JWT service
    let jwt_config = jwt::JwtConfig::from_env()?;
    let jwt_service = JwtService::new(jwt_config)?;

    // Initialize Redis connection pool
    let redis_config = common::cache::RedisConfig::from_env()?;
    let redis_pool = RedisPool::new(&redis_config).await?;

    // Outbound email
    let smtp_config = SmtpConfig::from_env()?;
    let mailer = SmtpMailer::new(&smtp_config)?;

    // Registration workflow over the Redis-backed store
    let user_repository = UserRepository::new(pool);
    let registration = RegistrationService::new(
        Arc::new(RedisRegistrationStore::new(redis_pool.clone())),
        Arc::new(user_repository.clone()),
        Arc::new(mailer),
        Arc::new(jwt_service.clone()),
        RegistrationConfig::from_env()?,
    );

    // Social login is optional; without credentials the endpoints reject
    let oauth_client = match OAuthConfig::twitter_from_env() {
        Some(config) => Some(OAuthClient::new_twitter(&config)?),
        None => {
            warn!("Twitter OAuth credentials not set; social login disabled");
            None
        }
    };

    let frontend_url =
        std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

    let app_state = AppState {
        redis_pool,
        jwt_service,
        user_repository,
        registration,
        oauth_client,
        frontend_url,
    };

    // Start the web server
    let app = routes::create_router(app_state);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Authentication service listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
