//! Typed façade over the external key/value store (Redis).
//!
//! [`KvStore`] is the minimum surface the rest of the crate needs. It is an
//! `async_trait` so tests can swap in [`FakeKv`](crate::kv::fake::FakeKv)
//! instead of talking to a live Redis.

pub mod fake;
mod redis_store;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ReactorError;

pub use fake::FakeKv;
pub use redis_store::RedisKv;

/// A held (or attempted) lease lock. Carries the random token used to tell
/// "our" acquisition apart from a later one that re-acquired the same key
/// after expiry, so release can never clobber someone else's lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub name: String,
    pub token: String,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ReactorError>;
    async fn set(&self, key: &str, value: String) -> Result<(), ReactorError>;
    async fn set_ex(&self, key: &str, value: String, ttl_seconds: u64) -> Result<(), ReactorError>;
    async fn del(&self, keys: &[String]) -> Result<(), ReactorError>;
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, ReactorError>;
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, ReactorError>;

    async fn zadd(&self, key: &str, score: f64, member: String) -> Result<(), ReactorError>;
    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>, ReactorError>;
    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<u64, ReactorError>;
    /// Read and remove `[min, max]` in one round trip, on a single snapshot.
    async fn pop_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>, ReactorError>;

    async fn sadd(&self, key: &str, member: String) -> Result<(), ReactorError>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>, ReactorError>;

    async fn lpush(&self, key: &str, value: String) -> Result<(), ReactorError>;
    async fn rpush(&self, key: &str, value: String) -> Result<(), ReactorError>;
    /// Push (front if `front`, else back) then trim to `cap` elements, atomically.
    async fn push_and_trim(
        &self,
        key: &str,
        value: String,
        cap: isize,
        front: bool,
    ) -> Result<(), ReactorError>;
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, ReactorError>;
    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), ReactorError>;

    async fn hset(&self, key: &str, field: &str, value: String) -> Result<(), ReactorError>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, ReactorError>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, ReactorError>;
    async fn hlen(&self, key: &str) -> Result<u64, ReactorError>;
    async fn hdel(&self, key: &str, field: &str) -> Result<(), ReactorError>;

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, ReactorError>;
    async fn server_time(&self) -> Result<DateTime<Utc>, ReactorError>;

    /// Non-blocking lease lock acquisition. `Ok(None)` means another holder
    /// owns it right now — normal control flow, not an error.
    async fn try_acquire_lock(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<LockHandle>, ReactorError>;

    /// Release a lock previously returned by `try_acquire_lock`, but only if
    /// it is still the current holder (compare-and-delete).
    async fn release_lock(&self, handle: &LockHandle) -> Result<(), ReactorError>;
}
