use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::{Cache, CACHE_PREFIX};
use crate::error::ReactorError;
use crate::kv::KvStore;

/// Cache backed by the same Redis the rest of the crate talks to, namespaced
/// under `cache:` so a flush can never touch event/cron/job keys.
pub struct RedisCache {
    kv: Arc<dyn KvStore>,
}

impl RedisCache {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn ns(key: &str) -> String {
        format!("{CACHE_PREFIX}{key}")
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn set(&self, key: &str, value: serde_json::Value, ttl_seconds: Option<u64>) {
        let key = Self::ns(key);
        let payload = value.to_string();
        let result = match ttl_seconds {
            Some(ttl) => self.kv.set_ex(&key, payload, ttl).await,
            None => self.kv.set(&key, payload).await,
        };
        if let Err(e) = result {
            tracing::error!("cache set {key} failed: {e}");
        }
    }

    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let key = Self::ns(key);
        match self.kv.get(&key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::error!("cache get {key} failed: {e}");
                None
            }
        }
    }

    async fn get_int(&self, key: &str) -> i64 {
        self.get(key).await.and_then(|v| v.as_i64()).unwrap_or(0)
    }

    async fn get_array(&self, key: &str, n: usize) -> Vec<serde_json::Value> {
        if n == 0 {
            return vec![];
        }
        let key = Self::ns(key);
        match self.kv.lrange(&key, 0, n as isize - 1).await {
            Ok(raw) => raw.iter().filter_map(|r| serde_json::from_str(r).ok()).collect(),
            Err(e) => {
                tracing::error!("cache get_array {key} failed: {e}");
                vec![]
            }
        }
    }

    async fn get_multi(&self, keys: &[String]) -> HashMap<String, Option<serde_json::Value>> {
        let namespaced: Vec<String> = keys.iter().map(|k| Self::ns(k)).collect();
        let values = match self.kv.mget(&namespaced).await {
            Ok(values) => values,
            Err(e) => {
                tracing::error!("cache get_multi failed: {e}");
                vec![None; keys.len()]
            }
        };
        keys.iter()
            .cloned()
            .zip(values.into_iter().map(|v| v.and_then(|raw| serde_json::from_str(&raw).ok())))
            .collect()
    }

    async fn incr(&self, key: &str, by: i64) -> i64 {
        let key = Self::ns(key);
        match self.kv.incr(&key, by).await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("cache incr {key} failed: {e}");
                0
            }
        }
    }

    async fn decr(&self, key: &str, by: i64) -> i64 {
        self.incr(key, -by).await
    }

    async fn prepend(&self, key: &str, value: serde_json::Value, cap: usize) {
        let key = Self::ns(key);
        if let Err(e) = self.kv.push_and_trim(&key, value.to_string(), cap as isize, true).await {
            tracing::error!("cache prepend {key} failed: {e}");
        }
    }

    async fn append(&self, key: &str, value: serde_json::Value, cap: usize) {
        let key = Self::ns(key);
        if let Err(e) = self.kv.push_and_trim(&key, value.to_string(), cap as isize, false).await {
            tracing::error!("cache append {key} failed: {e}");
        }
    }

    async fn unique_add(&self, set: &str, value: serde_json::Value) {
        let set = Self::ns(set);
        if let Err(e) = self.kv.sadd(&set, value.to_string()).await {
            tracing::error!("cache unique_add {set} failed: {e}");
        }
    }

    async fn get_unique_set(&self, set: &str) -> HashSet<String> {
        let set = Self::ns(set);
        match self.kv.smembers(&set).await {
            Ok(members) => members.into_iter().collect(),
            Err(e) => {
                tracing::error!("cache get_unique_set {set} failed: {e}");
                HashSet::new()
            }
        }
    }

    async fn set_hash(&self, key: &str, field: &str, value: serde_json::Value) {
        let key = Self::ns(key);
        if let Err(e) = self.kv.hset(&key, field, value.to_string()).await {
            tracing::error!("cache set_hash {key} failed: {e}");
        }
    }

    async fn get_hash(&self, key: &str, field: &str) -> Option<serde_json::Value> {
        let key = Self::ns(key);
        match self.kv.hget(&key, field).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::error!("cache get_hash {key} failed: {e}");
                None
            }
        }
    }

    async fn get_all_hashes(&self, key: &str) -> HashMap<String, serde_json::Value> {
        let key = Self::ns(key);
        match self.kv.hgetall(&key).await {
            Ok(raw) => raw
                .into_iter()
                .filter_map(|(field, v)| serde_json::from_str(&v).ok().map(|v| (field, v)))
                .collect(),
            Err(e) => {
                tracing::error!("cache get_all_hashes {key} failed: {e}");
                HashMap::new()
            }
        }
    }

    async fn get_hash_size(&self, key: &str) -> u64 {
        let key = Self::ns(key);
        match self.kv.hlen(&key).await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("cache get_hash_size {key} failed: {e}");
                0
            }
        }
    }

    async fn delete_hash_key(&self, key: &str, field: &str) {
        let key = Self::ns(key);
        if let Err(e) = self.kv.hdel(&key, field).await {
            tracing::error!("cache delete_hash_key {key} failed: {e}");
        }
    }

    async fn set_zset(&self, key: &str, score: f64, member: String) {
        let key = Self::ns(key);
        if let Err(e) = self.kv.zadd(&key, score, member).await {
            tracing::error!("cache set_zset {key} failed: {e}");
        }
    }

    async fn get_zrange_by_score(&self, key: &str, min: f64, max: f64) -> Vec<String> {
        let key = Self::ns(key);
        match self.kv.zrangebyscore(&key, min, max).await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("cache get_zrange_by_score {key} failed: {e}");
                vec![]
            }
        }
    }

    async fn del_zrange_by_score(&self, key: &str, min: f64, max: f64) {
        let key = Self::ns(key);
        if let Err(e) = self.kv.zremrangebyscore(&key, min, max).await {
            tracing::error!("cache del_zrange_by_score {key} failed: {e}");
        }
    }

    async fn remove(&self, keys: &[String]) {
        let namespaced: Vec<String> = keys.iter().map(|k| Self::ns(k)).collect();
        if let Err(e) = self.kv.del(&namespaced).await {
            tracing::error!("cache remove failed: {e}");
        }
    }

    async fn flush(&self, pattern: &str) -> Result<u64, ReactorError> {
        let pattern = Self::ns(pattern);
        let mut total = 0u64;
        let keys = self.kv.keys(&pattern).await?;
        for chunk in keys.chunks(1_000) {
            self.kv.del(&chunk.to_vec()).await?;
            total += chunk.len() as u64;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::fake::FakeKv;

    fn cache() -> RedisCache {
        RedisCache::new(Arc::new(FakeKv::new()))
    }

    #[tokio::test]
    async fn set_then_get_round_trips_through_json() {
        let cache = cache();
        cache.set("greeting", serde_json::json!("hi"), None).await;
        assert_eq!(cache.get("greeting").await, Some(serde_json::json!("hi")));
    }

    #[tokio::test]
    async fn keys_are_namespaced_under_cache_prefix() {
        let kv = Arc::new(FakeKv::new());
        let cache = RedisCache::new(kv.clone());
        cache.set("k", serde_json::json!(1), None).await;
        assert!(kv.get("cache:k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn get_multi_maps_missing_keys_to_none() {
        let cache = cache();
        cache.set("a", serde_json::json!(1), None).await;
        let result = cache.get_multi(&["a".to_string(), "b".to_string()]).await;
        assert_eq!(result.get("a"), Some(&Some(serde_json::json!(1))));
        assert_eq!(result.get("b"), Some(&None));
    }

    #[tokio::test]
    async fn get_array_of_zero_elements_is_empty() {
        let cache = cache();
        cache.append("log", serde_json::json!(1), 10).await;
        assert_eq!(cache.get_array("log", 0).await, vec![]);
    }

    #[tokio::test]
    async fn flush_deletes_only_matched_keys() {
        let cache = cache();
        cache.set("user:1", serde_json::json!(1), None).await;
        cache.set("session:1", serde_json::json!(1), None).await;
        let removed = cache.flush("user:*").await.unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get("user:1").await.is_none());
        assert!(cache.get("session:1").await.is_some());
    }
}
