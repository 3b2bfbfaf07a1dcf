//! Verification-code registration workflow
//!
//! A registration attempt lives in the ephemeral store under the email
//! address, from the first code send until it is either verified (and
//! promoted into a durable user) or expires. Sends are capped per email per
//! hour, resends are throttled by a cooldown, and verification attempts are
//! counted against the current code.
//!
//! Sending a code to an email that already has an account stores a
//! placeholder record flagged `is_existing_user` and emails a notice instead
//! of a code. That branch responds exactly like the genuine one and its
//! verification can never succeed, so the API's observable behavior does not
//! reveal whether an email is registered.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::code::{generate_code, hash_secret, verify_secret};
use crate::config::RegistrationConfig;
use crate::error::{ApiError, ApiResult};
use crate::mailer::Mailer;
use crate::models::{NewUser, User};
use crate::store::RegistrationStore;

/// Rolling window for the per-email send cap, independent of the
/// per-record verification window
const RATE_LIMIT_WINDOW_SECS: u64 = 3600;

/// In-flight registration attempt, stored as JSON in the ephemeral store
///
/// For an email that already has an account, `password_hash` and `nickname`
/// are empty and `is_existing_user` is set; such a record can never be
/// promoted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRegistration {
    pub email: String,
    pub password_hash: String,
    pub nickname: String,
    /// Salted hash of the current code; replaced wholesale on resend
    pub code_hash: String,
    /// Failed verification count against the current code; reset on resend
    pub attempts: u32,
    /// Unix timestamp of the last send or resend, drives the cooldown
    pub last_sent_at: i64,
    /// Unix timestamp of the first send, never updated
    pub created_at: i64,
    pub is_existing_user: bool,
}

/// Durable user operations the workflow depends on
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Whether a durable user with this email already exists
    async fn email_exists(&self, email: &str) -> Result<bool>;

    /// Create the user and its default settings as one atomic unit
    async fn create_with_settings(&self, new_user: &NewUser) -> Result<User>;
}

/// Session token issuance, opaque to the workflow
pub trait SessionIssuer: Send + Sync {
    fn issue(&self, user: &User) -> Result<String>;
}

/// Successful send/resend outcome
#[derive(Debug, Clone)]
pub struct CodeSent {
    pub email: String,
    /// Seconds until the pending registration expires
    pub expires_in: u64,
}

/// Successful verification outcome
#[derive(Debug, Clone)]
pub struct CompletedRegistration {
    pub user: User,
    pub access_token: String,
}

/// The send -> (resend)* -> verify workflow
#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn RegistrationStore>,
    users: Arc<dyn UserDirectory>,
    mailer: Arc<dyn Mailer>,
    sessions: Arc<dyn SessionIssuer>,
    config: RegistrationConfig,
}

fn registration_key(email: &str) -> String {
    format!("registration:{}", email)
}

fn rate_limit_key(email: &str) -> String {
    format!("rate_limit:registration:{}", email)
}

impl RegistrationService {
    /// Create a new registration service
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        users: Arc<dyn UserDirectory>,
        mailer: Arc<dyn Mailer>,
        sessions: Arc<dyn SessionIssuer>,
        config: RegistrationConfig,
    ) -> Self {
        Self {
            store,
            users,
            mailer,
            sessions,
            config,
        }
    }

    /// Start (or restart) a registration: store a pending record and email
    /// either the code or the existing-account notice
    pub async fn send_code(
        &self,
        email: &str,
        password: &str,
        nickname: &str,
    ) -> ApiResult<CodeSent> {
        let counter_key = rate_limit_key(email);
        let sends: u32 = self
            .store
            .get(&counter_key)
            .await?
            .and_then(|value| value.parse().ok())
            .unwrap_or(0);
        if sends >= self.config.max_attempts {
            return Err(ApiError::RateLimitExceeded);
        }

        let is_existing_user = self.users.email_exists(email).await?;

        let code = generate_code();
        let now = Utc::now().timestamp();

        // The placeholder record for an existing account goes through the
        // same store/write/email sequence as a genuine one
        let record = if is_existing_user {
            PendingRegistration {
                email: email.to_string(),
                password_hash: String::new(),
                nickname: String::new(),
                code_hash: hash_secret(&code)?,
                attempts: 0,
                last_sent_at: now,
                created_at: now,
                is_existing_user: true,
            }
        } else {
            PendingRegistration {
                email: email.to_string(),
                password_hash: hash_secret(password)?,
                nickname: nickname.to_string(),
                code_hash: hash_secret(&code)?,
                attempts: 0,
                last_sent_at: now,
                created_at: now,
                is_existing_user: false,
            }
        };

        self.put_record(&record, self.config.code_ttl).await?;

        self.dispatch_email(&record, &code).await;

        self.store.increment(&counter_key).await?;
        self.store
            .expire(&counter_key, RATE_LIMIT_WINDOW_SECS)
            .await?;

        info!("Registration code sent for {}", email);

        Ok(CodeSent {
            email: email.to_string(),
            expires_in: self.config.code_ttl,
        })
    }

    /// Rotate the code of an in-flight registration after the cooldown
    pub async fn resend_code(&self, email: &str) -> ApiResult<CodeSent> {
        // Absent record reads exactly like a wrong code
        let mut record = self
            .load_record(email)
            .await?
            .ok_or(ApiError::InvalidVerificationCode)?;

        let now = Utc::now().timestamp();
        let elapsed = now - record.last_sent_at;
        if elapsed < self.config.resend_cooldown {
            return Err(ApiError::ResendCooldown {
                retry_after: self.config.resend_cooldown - elapsed,
            });
        }

        let code = generate_code();
        record.code_hash = hash_secret(&code)?;
        record.last_sent_at = now;
        record.attempts = 0;

        // Preserve the original window; only fall back to a fresh one when
        // the record is about to lapse, so resending cannot extend the
        // overall window indefinitely
        let ttl = self
            .store
            .ttl_remaining(&registration_key(email))
            .await?
            .unwrap_or(self.config.code_ttl);
        self.put_record(&record, ttl).await?;

        self.dispatch_email(&record, &code).await;

        info!("Registration code resent for {}", email);

        Ok(CodeSent {
            email: email.to_string(),
            expires_in: ttl,
        })
    }

    /// Check a submitted code; on success promote the pending registration
    /// into a durable user and issue a session token
    pub async fn verify_code(&self, email: &str, code: &str) -> ApiResult<CompletedRegistration> {
        let key = registration_key(email);
        let mut record = self
            .load_record(email)
            .await?
            .ok_or(ApiError::InvalidVerificationCode)?;

        if record.attempts >= self.config.max_attempts {
            return Err(ApiError::TooManyAttempts);
        }

        if !verify_secret(code, &record.code_hash)? {
            record.attempts += 1;
            let ttl = self
                .store
                .ttl_remaining(&key)
                .await?
                .unwrap_or(self.config.code_ttl);
            self.put_record(&record, ttl).await?;
            return Err(ApiError::InvalidVerificationCode);
        }

        if record.is_existing_user {
            // Correct code on a placeholder record: the attempt dead-ends
            // with the same error a wrong code produces
            self.store.delete(&key).await?;
            return Err(ApiError::InvalidVerificationCode);
        }

        let new_user = NewUser {
            email: record.email.clone(),
            twitter_id: None,
            password_hash: Some(record.password_hash.clone()),
            nickname: record.nickname.clone(),
        };
        // On failure the record stays, so the user can retry the same code
        let user = self.users.create_with_settings(&new_user).await?;

        self.store.delete(&key).await?;

        let access_token = self.sessions.issue(&user)?;

        info!("Registration completed for {}", email);

        Ok(CompletedRegistration { user, access_token })
    }

    async fn load_record(&self, email: &str) -> ApiResult<Option<PendingRegistration>> {
        let raw = self.store.get(&registration_key(email)).await?;
        match raw {
            Some(raw) => {
                let record = serde_json::from_str(&raw)
                    .context("Failed to deserialize pending registration")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn put_record(&self, record: &PendingRegistration, ttl: u64) -> ApiResult<()> {
        let json =
            serde_json::to_string(record).context("Failed to serialize pending registration")?;
        self.store
            .set(&registration_key(&record.email), &json, ttl)
            .await?;
        Ok(())
    }

    /// Best-effort dispatch: a lost email must not fail the request
    async fn dispatch_email(&self, record: &PendingRegistration, code: &str) {
        let result = if record.is_existing_user {
            self.mailer
                .send_registration_attempt_notice(&record.email)
                .await
        } else {
            self.mailer
                .send_verification_code(&record.email, code)
                .await
        };

        if let Err(e) = result {
            error!("Failed to send registration email to {}: {:#}", record.email, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};
    use uuid::Uuid;

    /// In-memory stand-in for Redis with per-key expiry
    #[derive(Default)]
    struct MemoryStore {
        entries: Mutex<HashMap<String, (String, Option<Instant>)>>,
    }

    impl MemoryStore {
        fn live_value(&self, key: &str) -> Option<String> {
            let mut entries = self.entries.lock().unwrap();
            let expired =
                matches!(entries.get(key), Some((_, Some(at))) if *at <= Instant::now());
            if expired {
                entries.remove(key);
                return None;
            }
            entries.get(key).map(|(value, _)| value.clone())
        }
    }

    #[async_trait]
    impl RegistrationStore for MemoryStore {
        async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
            let expires_at = Instant::now() + Duration::from_secs(ttl_seconds);
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), (value.to_string(), Some(expires_at)));
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.live_value(key))
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }

        async fn ttl_remaining(&self, key: &str) -> Result<Option<u64>> {
            let entries = self.entries.lock().unwrap();
            Ok(entries.get(key).and_then(|(_, expires_at)| {
                expires_at.map(|at| {
                    at.saturating_duration_since(Instant::now())
                        .as_secs_f64()
                        .ceil() as u64
                })
            }))
        }

        async fn increment(&self, key: &str) -> Result<i64> {
            let mut entries = self.entries.lock().unwrap();
            let (value, expires_at) = entries
                .get(key)
                .map(|(v, e)| (v.clone(), *e))
                .unwrap_or((String::new(), None));
            let next = value.parse::<i64>().unwrap_or(0) + 1;
            entries.insert(key.to_string(), (next.to_string(), expires_at));
            Ok(next)
        }

        async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()> {
            let mut entries = self.entries.lock().unwrap();
            if let Some((value, _)) = entries.get(key).cloned() {
                entries.insert(
                    key.to_string(),
                    (value, Some(Instant::now() + Duration::from_secs(ttl_seconds))),
                );
            }
            Ok(())
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum SentMail {
        Code { to: String, code: String },
        Notice { to: String },
    }

    /// Mailer that records instead of sending; tests read the plaintext
    /// code back out of it
    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<SentMail>>,
    }

    impl RecordingMailer {
        fn last_code(&self, to: &str) -> Option<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find_map(|mail| match mail {
                    SentMail::Code { to: t, code } if t == to => Some(code.clone()),
                    _ => None,
                })
        }

        fn all(&self) -> Vec<SentMail> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send_verification_code(&self, to: &str, code: &str) -> Result<()> {
            self.sent.lock().unwrap().push(SentMail::Code {
                to: to.to_string(),
                code: code.to_string(),
            });
            Ok(())
        }

        async fn send_registration_attempt_notice(&self, to: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push(SentMail::Notice { to: to.to_string() });
            Ok(())
        }
    }

    /// In-memory user directory; `fail_next_create` simulates a database
    /// failure during promotion
    #[derive(Default)]
    struct MemoryUsers {
        users: Mutex<Vec<User>>,
        fail_next_create: AtomicBool,
    }

    impl MemoryUsers {
        fn seed(&self, email: &str) {
            self.users.lock().unwrap().push(make_user(email));
        }

        fn count_with_email(&self, email: &str) -> usize {
            self.users
                .lock()
                .unwrap()
                .iter()
                .filter(|u| u.email == email)
                .count()
        }

        fn find(&self, email: &str) -> Option<User> {
            self.users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.email == email)
                .cloned()
        }
    }

    fn make_user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            twitter_id: None,
            password_hash: None,
            nickname: "Seeded".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[async_trait]
    impl UserDirectory for MemoryUsers {
        async fn email_exists(&self, email: &str) -> Result<bool> {
            Ok(self.users.lock().unwrap().iter().any(|u| u.email == email))
        }

        async fn create_with_settings(&self, new_user: &NewUser) -> Result<User> {
            if self.fail_next_create.swap(false, Ordering::SeqCst) {
                anyhow::bail!("database unavailable");
            }
            let user = User {
                id: Uuid::new_v4(),
                email: new_user.email.clone(),
                twitter_id: new_user.twitter_id.clone(),
                password_hash: new_user.password_hash.clone(),
                nickname: new_user.nickname.clone(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            self.users.lock().unwrap().push(user.clone());
            Ok(user)
        }
    }

    struct StaticIssuer;

    impl SessionIssuer for StaticIssuer {
        fn issue(&self, _user: &User) -> Result<String> {
            Ok("test-session-token".to_string())
        }
    }

    struct Harness {
        service: RegistrationService,
        store: Arc<MemoryStore>,
        mailer: Arc<RecordingMailer>,
        users: Arc<MemoryUsers>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::default());
        let mailer = Arc::new(RecordingMailer::default());
        let users = Arc::new(MemoryUsers::default());
        let service = RegistrationService::new(
            store.clone(),
            users.clone(),
            mailer.clone(),
            Arc::new(StaticIssuer),
            RegistrationConfig::default(),
        );
        Harness {
            service,
            store,
            mailer,
            users,
        }
    }

    const EMAIL: &str = "a@x.com";
    const PASSWORD: &str = "Passw0rd";
    const NICKNAME: &str = "Nick";

    async fn read_record(store: &MemoryStore, email: &str) -> Option<PendingRegistration> {
        store
            .get(&registration_key(email))
            .await
            .unwrap()
            .map(|raw| serde_json::from_str(&raw).unwrap())
    }

    async fn write_record(store: &MemoryStore, record: &PendingRegistration, ttl: u64) {
        store
            .set(
                &registration_key(&record.email),
                &serde_json::to_string(record).unwrap(),
                ttl,
            )
            .await
            .unwrap();
    }

    /// Pin the record's last-sent timestamp to a fixed age so resend
    /// cooldown checks can be exercised without sleeping
    async fn set_last_sent_secs_ago(store: &MemoryStore, email: &str, seconds: i64) {
        let mut record = read_record(store, email).await.unwrap();
        record.last_sent_at = Utc::now().timestamp() - seconds;
        let ttl = store
            .ttl_remaining(&registration_key(email))
            .await
            .unwrap()
            .unwrap_or(600);
        write_record(store, &record, ttl).await;
    }

    #[tokio::test]
    async fn test_verify_before_send_is_rejected() {
        let h = harness();
        let err = h.service.verify_code(EMAIL, "123456").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidVerificationCode));
    }

    #[tokio::test]
    async fn test_send_then_verify_creates_user_once() {
        let h = harness();

        let sent = h.service.send_code(EMAIL, PASSWORD, NICKNAME).await.unwrap();
        assert_eq!(sent.email, EMAIL);
        assert_eq!(sent.expires_in, 600);

        let record = read_record(&h.store, EMAIL).await.unwrap();
        assert_eq!(record.attempts, 0);
        assert!(!record.is_existing_user);

        let code = h.mailer.last_code(EMAIL).unwrap();
        let completed = h.service.verify_code(EMAIL, &code).await.unwrap();

        assert_eq!(completed.user.email, EMAIL);
        assert_eq!(completed.user.nickname, NICKNAME);
        assert_eq!(completed.access_token, "test-session-token");
        assert_eq!(h.users.count_with_email(EMAIL), 1);

        // The stored password hash verifies against the original password
        let stored = h.users.find(EMAIL).unwrap().password_hash.unwrap();
        assert!(verify_secret(PASSWORD, &stored).unwrap());

        // Pending record is gone; a second verify cannot succeed
        assert!(read_record(&h.store, EMAIL).await.is_none());
        let err = h.service.verify_code(EMAIL, &code).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidVerificationCode));
    }

    #[tokio::test]
    async fn test_wrong_code_counts_attempts_then_locks() {
        let h = harness();
        h.service.send_code(EMAIL, PASSWORD, NICKNAME).await.unwrap();
        let correct = h.mailer.last_code(EMAIL).unwrap();
        let wrong = if correct == "000000" { "000001" } else { "000000" };

        for expected_attempts in 1u32..=5 {
            let err = h.service.verify_code(EMAIL, wrong).await.unwrap_err();
            assert!(matches!(err, ApiError::InvalidVerificationCode));
            let record = read_record(&h.store, EMAIL).await.unwrap();
            assert_eq!(record.attempts, expected_attempts);
        }

        // Exhausted: even the correct code is rejected, and the record is
        // left untouched to expire on its own
        let err = h.service.verify_code(EMAIL, &correct).await.unwrap_err();
        assert!(matches!(err, ApiError::TooManyAttempts));
        let record = read_record(&h.store, EMAIL).await.unwrap();
        assert_eq!(record.attempts, 5);
    }

    #[tokio::test]
    async fn test_resend_rotates_code_and_resets_attempts() {
        let h = harness();
        h.service.send_code(EMAIL, PASSWORD, NICKNAME).await.unwrap();
        let old_code = h.mailer.last_code(EMAIL).unwrap();
        let wrong = if old_code == "000000" { "000001" } else { "000000" };

        for _ in 0..2 {
            let _ = h.service.verify_code(EMAIL, wrong).await;
        }
        assert_eq!(read_record(&h.store, EMAIL).await.unwrap().attempts, 2);

        set_last_sent_secs_ago(&h.store, EMAIL, 61).await;
        h.service.resend_code(EMAIL).await.unwrap();

        let record = read_record(&h.store, EMAIL).await.unwrap();
        assert_eq!(record.attempts, 0);

        // The old code was invalidated, and the failed attempt counts as
        // the first of a fresh window
        let err = h.service.verify_code(EMAIL, &old_code).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidVerificationCode));
        assert_eq!(read_record(&h.store, EMAIL).await.unwrap().attempts, 1);

        let new_code = h.mailer.last_code(EMAIL).unwrap();
        assert_ne!(new_code, old_code);
        h.service.verify_code(EMAIL, &new_code).await.unwrap();
        assert_eq!(h.users.count_with_email(EMAIL), 1);
    }

    #[tokio::test]
    async fn test_resend_cooldown_boundary() {
        let h = harness();
        h.service.send_code(EMAIL, PASSWORD, NICKNAME).await.unwrap();

        set_last_sent_secs_ago(&h.store, EMAIL, 59).await;
        let err = h.service.resend_code(EMAIL).await.unwrap_err();
        match err {
            ApiError::ResendCooldown { retry_after } => assert_eq!(retry_after, 1),
            other => panic!("expected ResendCooldown, got {:?}", other),
        }

        set_last_sent_secs_ago(&h.store, EMAIL, 60).await;
        assert!(h.service.resend_code(EMAIL).await.is_ok());
    }

    #[tokio::test]
    async fn test_resend_without_pending_registration() {
        let h = harness();
        let err = h.service.resend_code(EMAIL).await.unwrap_err();
        // Same error as a wrong code, not a distinct "not found"
        assert!(matches!(err, ApiError::InvalidVerificationCode));
    }

    #[tokio::test]
    async fn test_resend_reports_remaining_window() {
        let h = harness();
        h.service.send_code(EMAIL, PASSWORD, NICKNAME).await.unwrap();

        // Shrink the record's remaining window, then resend
        let mut record = read_record(&h.store, EMAIL).await.unwrap();
        record.last_sent_at -= 61;
        write_record(&h.store, &record, 100).await;

        let sent = h.service.resend_code(EMAIL).await.unwrap();
        assert!(
            (95..=100).contains(&sent.expires_in),
            "resend must keep the remaining window, got {}",
            sent.expires_in
        );
    }

    #[tokio::test]
    async fn test_existing_email_send_looks_identical() {
        let h = harness();
        h.users.seed(EMAIL);

        let sent = h.service.send_code(EMAIL, PASSWORD, NICKNAME).await.unwrap();
        assert_eq!(sent.email, EMAIL);
        assert_eq!(sent.expires_in, 600);

        // Notice mail instead of a code mail
        assert_eq!(
            h.mailer.all(),
            vec![SentMail::Notice {
                to: EMAIL.to_string()
            }]
        );

        // Placeholder record carries no credentials
        let record = read_record(&h.store, EMAIL).await.unwrap();
        assert!(record.is_existing_user);
        assert!(record.password_hash.is_empty());
        assert!(record.nickname.is_empty());
    }

    #[tokio::test]
    async fn test_existing_email_verify_never_succeeds() {
        let h = harness();
        h.users.seed(EMAIL);

        let now = Utc::now().timestamp();
        let record = PendingRegistration {
            email: EMAIL.to_string(),
            password_hash: String::new(),
            nickname: String::new(),
            code_hash: hash_secret("123456").unwrap(),
            attempts: 0,
            last_sent_at: now,
            created_at: now,
            is_existing_user: true,
        };
        write_record(&h.store, &record, 600).await;

        // Wrong code: counted like the genuine branch, record stays
        let err = h.service.verify_code(EMAIL, "654321").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidVerificationCode));
        assert_eq!(read_record(&h.store, EMAIL).await.unwrap().attempts, 1);

        // Correct code: still rejected, and the record is consumed
        let err = h.service.verify_code(EMAIL, "123456").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidVerificationCode));
        assert!(read_record(&h.store, EMAIL).await.is_none());

        // No second user was ever created
        assert_eq!(h.users.count_with_email(EMAIL), 1);
    }

    #[tokio::test]
    async fn test_send_rate_limit_boundary() {
        let h = harness();

        for _ in 0..5 {
            h.service.send_code(EMAIL, PASSWORD, NICKNAME).await.unwrap();
        }

        let err = h.service.send_code(EMAIL, PASSWORD, NICKNAME).await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimitExceeded));

        // Other emails are unaffected
        assert!(h.service.send_code("b@x.com", PASSWORD, NICKNAME).await.is_ok());
    }

    #[tokio::test]
    async fn test_resend_does_not_count_toward_rate_limit() {
        let h = harness();
        h.service.send_code(EMAIL, PASSWORD, NICKNAME).await.unwrap();

        set_last_sent_secs_ago(&h.store, EMAIL, 61).await;
        h.service.resend_code(EMAIL).await.unwrap();

        let counter = h.store.get(&rate_limit_key(EMAIL)).await.unwrap();
        assert_eq!(counter, Some("1".to_string()));
    }

    #[tokio::test]
    async fn test_failed_promotion_keeps_pending_record() {
        let h = harness();
        h.service.send_code(EMAIL, PASSWORD, NICKNAME).await.unwrap();
        let code = h.mailer.last_code(EMAIL).unwrap();

        h.users.fail_next_create.store(true, Ordering::SeqCst);
        let err = h.service.verify_code(EMAIL, &code).await.unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));

        // Record survived, so the same code works once the database is back
        assert!(read_record(&h.store, EMAIL).await.is_some());
        let completed = h.service.verify_code(EMAIL, &code).await.unwrap();
        assert_eq!(completed.user.email, EMAIL);
        assert_eq!(h.users.count_with_email(EMAIL), 1);
    }

    #[tokio::test]
    async fn test_send_replaces_prior_pending_record() {
        let h = harness();
        h.service.send_code(EMAIL, PASSWORD, NICKNAME).await.unwrap();
        let first_code = h.mailer.last_code(EMAIL).unwrap();

        // A second send fully replaces the record and invalidates the
        // first code
        h.service.send_code(EMAIL, PASSWORD, NICKNAME).await.unwrap();
        let second_code = h.mailer.last_code(EMAIL).unwrap();

        if first_code != second_code {
            let err = h.service.verify_code(EMAIL, &first_code).await.unwrap_err();
            assert!(matches!(err, ApiError::InvalidVerificationCode));
        }
        h.service.verify_code(EMAIL, &second_code).await.unwrap();
    }
}
