use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rand::distributions::{Alphanumeric, DistString};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::ReactorError;
use crate::kv::{KvStore, LockHandle};

/// Lua script for compare-and-delete release: only deletes the lock key if
/// its value still matches the token the caller acquired it with, so a
/// handle can never release a lock a different replica has since
/// re-acquired after expiry.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Redis-backed [`KvStore`], built on a multiplexed
/// [`ConnectionManager`] — cheap to clone, safe to share across tasks.
#[derive(Clone)]
pub struct RedisKv {
    conn: ConnectionManager,
}

impl RedisKv {
    pub async fn connect(url: &str) -> Result<Self, ReactorError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>, ReactorError> {
        let mut conn = self.conn();
        match conn.get(key).await {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::error!("KV GET {key} failed: {e}");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), ReactorError> {
        let mut conn = self.conn();
        if let Err(e) = conn.set::<_, _, ()>(key, value).await {
            tracing::error!("KV SET {key} failed: {e}");
        }
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: String, ttl_seconds: u64) -> Result<(), ReactorError> {
        let mut conn = self.conn();
        let result: redis::RedisResult<((), ())> = redis::pipe()
            .atomic()
            .set(key, value)
            .expire(key, ttl_seconds as i64)
            .query_async(&mut conn)
            .await;
        if let Err(e) = result {
            tracing::error!("KV SET_EX {key} failed: {e}");
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), ReactorError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        if let Err(e) = conn.del::<_, ()>(keys).await {
            tracing::error!("KV DEL {keys:?} failed: {e}");
        }
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, ReactorError> {
        if keys.is_empty() {
            return Ok(vec![]);
        }
        let mut conn = self.conn();
        match conn.mget(keys).await {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::error!("KV MGET {keys:?} failed: {e}");
                Ok(vec![None; keys.len()])
            }
        }
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, ReactorError> {
        let mut conn = self.conn();
        match conn.incr(key, delta).await {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::error!("KV INCRBY {key} failed: {e}");
                Ok(0)
            }
        }
    }

    async fn zadd(&self, key: &str, score: f64, member: String) -> Result<(), ReactorError> {
        let mut conn = self.conn();
        if let Err(e) = conn.zadd::<_, _, _, ()>(key, member, score).await {
            tracing::error!("KV ZADD {key} failed: {e}");
        }
        Ok(())
    }

    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>, ReactorError> {
        let mut conn = self.conn();
        match conn.zrangebyscore(key, min, max).await {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::error!("KV ZRANGEBYSCORE {key} failed: {e}");
                Ok(vec![])
            }
        }
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<u64, ReactorError> {
        let mut conn = self.conn();
        match conn.zrembyscore(key, min, max).await {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::error!("KV ZREMRANGEBYSCORE {key} failed: {e}");
                Ok(0)
            }
        }
    }

    async fn pop_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>, ReactorError> {
        let mut conn = self.conn();
        let result: redis::RedisResult<(Vec<String>, u64)> = redis::pipe()
            .atomic()
            .zrangebyscore(key, min, max)
            .zrembyscore(key, min, max)
            .query_async(&mut conn)
            .await;

        match result {
            Ok((members, _)) => Ok(members),
            Err(e) => {
                tracing::error!("KV pop_range_by_score({key}) failed: {e}");
                Ok(vec![])
            }
        }
    }

    async fn sadd(&self, key: &str, member: String) -> Result<(), ReactorError> {
        let mut conn = self.conn();
        if let Err(e) = conn.sadd::<_, _, ()>(key, member).await {
            tracing::error!("KV SADD {key} failed: {e}");
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, ReactorError> {
        let mut conn = self.conn();
        match conn.smembers(key).await {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::error!("KV SMEMBERS {key} failed: {e}");
                Ok(vec![])
            }
        }
    }

    async fn lpush(&self, key: &str, value: String) -> Result<(), ReactorError> {
        let mut conn = self.conn();
        if let Err(e) = conn.lpush::<_, _, ()>(key, value).await {
            tracing::error!("KV LPUSH {key} failed: {e}");
        }
        Ok(())
    }

    async fn rpush(&self, key: &str, value: String) -> Result<(), ReactorError> {
        let mut conn = self.conn();
        if let Err(e) = conn.rpush::<_, _, ()>(key, value).await {
            tracing::error!("KV RPUSH {key} failed: {e}");
        }
        Ok(())
    }

    async fn push_and_trim(
        &self,
        key: &str,
        value: String,
        cap: isize,
        front: bool,
    ) -> Result<(), ReactorError> {
        let mut conn = self.conn();
        let mut pipe = redis::pipe();
        let pipe = pipe.atomic();
        if front {
            pipe.lpush(key, value);
        } else {
            pipe.rpush(key, value);
        }
        pipe.ltrim(key, 0, cap - 1);
        let result: redis::RedisResult<((), ())> = pipe.query_async(&mut conn).await;
        if let Err(e) = result {
            tracing::error!("KV push_and_trim({key}) failed: {e}");
        }
        Ok(())
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, ReactorError> {
        let mut conn = self.conn();
        match conn.lrange(key, start, stop).await {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::error!("KV LRANGE {key} failed: {e}");
                Ok(vec![])
            }
        }
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), ReactorError> {
        let mut conn = self.conn();
        if let Err(e) = conn.ltrim::<_, ()>(key, start, stop).await {
            tracing::error!("KV LTRIM {key} failed: {e}");
        }
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: String) -> Result<(), ReactorError> {
        let mut conn = self.conn();
        if let Err(e) = conn.hset::<_, _, _, ()>(key, field, value).await {
            tracing::error!("KV HSET {key} failed: {e}");
        }
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, ReactorError> {
        let mut conn = self.conn();
        match conn.hget(key, field).await {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::error!("KV HGET {key} failed: {e}");
                Ok(None)
            }
        }
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, ReactorError> {
        let mut conn = self.conn();
        match conn.hgetall(key).await {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::error!("KV HGETALL {key} failed: {e}");
                Ok(HashMap::new())
            }
        }
    }

    async fn hlen(&self, key: &str) -> Result<u64, ReactorError> {
        let mut conn = self.conn();
        match conn.hlen(key).await {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::error!("KV HLEN {key} failed: {e}");
                Ok(0)
            }
        }
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), ReactorError> {
        let mut conn = self.conn();
        if let Err(e) = conn.hdel::<_, _, ()>(key, field).await {
            tracing::error!("KV HDEL {key} failed: {e}");
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, ReactorError> {
        let mut conn = self.conn();
        match conn.keys(pattern).await {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::error!("KV KEYS {pattern} failed: {e}");
                Ok(vec![])
            }
        }
    }

    async fn server_time(&self) -> Result<DateTime<Utc>, ReactorError> {
        let mut conn = self.conn();
        match redis::cmd("TIME")
            .query_async::<_, (i64, i64)>(&mut conn)
            .await
        {
            Ok((secs, micros)) => Ok(Utc
                .timestamp_opt(secs, (micros as u32) * 1_000)
                .single()
                .unwrap_or_else(Utc::now)),
            Err(e) => {
                tracing::error!("KV TIME failed: {e}");
                Ok(Utc::now())
            }
        }
    }

    async fn try_acquire_lock(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<LockHandle>, ReactorError> {
        let token = Alphanumeric.sample_string(&mut rand::thread_rng(), 20);
        let mut conn = self.conn();
        let result: redis::RedisResult<Option<String>> = redis::cmd("SET")
            .arg(name)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(Some(_)) => Ok(Some(LockHandle {
                name: name.to_string(),
                token,
            })),
            Ok(None) => Ok(None),
            Err(e) => {
                tracing::error!("KV lock acquire {name} failed: {e}");
                Ok(None)
            }
        }
    }

    async fn release_lock(&self, handle: &LockHandle) -> Result<(), ReactorError> {
        let mut conn = self.conn();
        let script = redis::Script::new(RELEASE_SCRIPT);
        let result: redis::RedisResult<i64> = script
            .key(&handle.name)
            .arg(&handle.token)
            .invoke_async(&mut conn)
            .await;
        if let Err(e) = result {
            tracing::error!("KV lock release {} failed: {e}", handle.name);
        }
        Ok(())
    }
}
