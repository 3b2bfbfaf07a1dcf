//! Ephemeral key-value store backing the registration workflow
//!
//! The workflow only needs a handful of operations over an expiring
//! key-value store, so they are expressed as a trait. Production uses the
//! shared Redis pool; tests inject an in-memory implementation.

use anyhow::Result;
use async_trait::async_trait;
use common::cache::RedisPool;

/// Expiring key-value store operations used by the registration workflow
///
/// A `get` immediately following a `set` must observe the written value;
/// expiry is handled by the store, not by explicit deletion.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Write a value under a key with the given TTL, replacing any prior
    /// value and its TTL
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()>;

    /// Read a value; None when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove a key; removing an absent key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remaining TTL in seconds; None when the key is absent or has no expiry
    async fn ttl_remaining(&self, key: &str) -> Result<Option<u64>>;

    /// Atomically increment an integer key, creating it at 1; the key's TTL
    /// is unaffected
    async fn increment(&self, key: &str) -> Result<i64>;

    /// Set the TTL of an existing key
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()>;
}

/// Redis-backed registration store
#[derive(Clone)]
pub struct RedisRegistrationStore {
    pool: RedisPool,
}

impl RedisRegistrationStore {
    /// Create a new store over the shared Redis pool
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RegistrationStore for RedisRegistrationStore {
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        self.pool.set(key, value, Some(ttl_seconds)).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.pool.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.pool.delete(key).await
    }

    async fn ttl_remaining(&self, key: &str) -> Result<Option<u64>> {
        // Redis returns -2 for a missing key and -1 for a key without expiry
        let ttl = self.pool.ttl(key).await?;
        Ok(if ttl > 0 { Some(ttl as u64) } else { None })
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        self.pool.incr(key).await
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()> {
        self.pool.expire(key, ttl_seconds as i64).await
    }
}
