use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::cache::{pattern_to_regex, Cache};
use crate::error::ReactorError;

struct Entry {
    value: serde_json::Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

#[derive(Default)]
struct State {
    scalars: HashMap<String, Entry>,
    lists: HashMap<String, Vec<serde_json::Value>>,
    sets: HashMap<String, HashSet<String>>,
    hashes: HashMap<String, HashMap<String, serde_json::Value>>,
    zsets: HashMap<String, Vec<(String, f64)>>,
}

/// Process-local cache with the same semantics as [`RedisCache`](crate::cache::RedisCache),
/// used in tests and single-process embeddings. TTL is enforced lazily: an
/// expired entry is evicted the next time it's read, not on a timer.
pub struct MemoryCache {
    state: Mutex<State>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn set(&self, key: &str, value: serde_json::Value, ttl_seconds: Option<u64>) {
        let mut state = self.state.lock().unwrap();
        state.scalars.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl_seconds.map(|s| Instant::now() + Duration::from_secs(s)),
            },
        );
    }

    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut state = self.state.lock().unwrap();
        let expired = state.scalars.get(key).is_some_and(Entry::is_expired);
        if expired {
            state.scalars.remove(key);
            return None;
        }
        state.scalars.get(key).map(|e| e.value.clone())
    }

    async fn get_int(&self, key: &str) -> i64 {
        self.get(key).await.and_then(|v| v.as_i64()).unwrap_or(0)
    }

    async fn get_array(&self, key: &str, n: usize) -> Vec<serde_json::Value> {
        let state = self.state.lock().unwrap();
        state
            .lists
            .get(key)
            .map(|list| list.iter().take(n).cloned().collect())
            .unwrap_or_default()
    }

    async fn get_multi(&self, keys: &[String]) -> HashMap<String, Option<serde_json::Value>> {
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            out.insert(key.clone(), self.get(key).await);
        }
        out
    }

    async fn incr(&self, key: &str, by: i64) -> i64 {
        let current = self.get_int(key).await;
        let next = current + by;
        self.set(key, serde_json::json!(next), None).await;
        next
    }

    async fn decr(&self, key: &str, by: i64) -> i64 {
        self.incr(key, -by).await
    }

    async fn prepend(&self, key: &str, value: serde_json::Value, cap: usize) {
        let mut state = self.state.lock().unwrap();
        let list = state.lists.entry(key.to_string()).or_default();
        list.insert(0, value);
        list.truncate(cap);
    }

    async fn append(&self, key: &str, value: serde_json::Value, cap: usize) {
        let mut state = self.state.lock().unwrap();
        let list = state.lists.entry(key.to_string()).or_default();
        list.push(value);
        let len = list.len();
        if len > cap {
            list.drain(0..len - cap);
        }
    }

    async fn unique_add(&self, set: &str, value: serde_json::Value) {
        let mut state = self.state.lock().unwrap();
        state
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(value.to_string());
    }

    async fn get_unique_set(&self, set: &str) -> HashSet<String> {
        self.state.lock().unwrap().sets.get(set).cloned().unwrap_or_default()
    }

    async fn set_hash(&self, key: &str, field: &str, value: serde_json::Value) {
        let mut state = self.state.lock().unwrap();
        state
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }

    async fn get_hash(&self, key: &str, field: &str) -> Option<serde_json::Value> {
        self.state.lock().unwrap().hashes.get(key).and_then(|h| h.get(field)).cloned()
    }

    async fn get_all_hashes(&self, key: &str) -> HashMap<String, serde_json::Value> {
        self.state.lock().unwrap().hashes.get(key).cloned().unwrap_or_default()
    }

    async fn get_hash_size(&self, key: &str) -> u64 {
        self.state.lock().unwrap().hashes.get(key).map(|h| h.len()).unwrap_or(0) as u64
    }

    async fn delete_hash_key(&self, key: &str, field: &str) {
        if let Some(h) = self.state.lock().unwrap().hashes.get_mut(key) {
            h.remove(field);
        }
    }

    async fn set_zset(&self, key: &str, score: f64, member: String) {
        let mut state = self.state.lock().unwrap();
        let set = state.zsets.entry(key.to_string()).or_default();
        set.retain(|(m, _)| m != &member);
        set.push((member, score));
    }

    async fn get_zrange_by_score(&self, key: &str, min: f64, max: f64) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut members: Vec<_> = state
            .zsets
            .get(key)
            .into_iter()
            .flatten()
            .filter(|(_, score)| *score >= min && *score <= max)
            .cloned()
            .collect();
        members.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        members.into_iter().map(|(m, _)| m).collect()
    }

    async fn del_zrange_by_score(&self, key: &str, min: f64, max: f64) {
        if let Some(set) = self.state.lock().unwrap().zsets.get_mut(key) {
            set.retain(|(_, score)| !(*score >= min && *score <= max));
        }
    }

    async fn remove(&self, keys: &[String]) {
        let mut state = self.state.lock().unwrap();
        for key in keys {
            state.scalars.remove(key);
            state.lists.remove(key);
            state.sets.remove(key);
            state.hashes.remove(key);
            state.zsets.remove(key);
        }
    }

    async fn flush(&self, pattern: &str) -> Result<u64, ReactorError> {
        let regex = pattern_to_regex(pattern);
        let mut state = self.state.lock().unwrap();
        let mut matched: Vec<String> = state.scalars.keys().cloned().collect();
        matched.extend(state.lists.keys().cloned());
        matched.extend(state.sets.keys().cloned());
        matched.extend(state.hashes.keys().cloned());
        matched.extend(state.zsets.keys().cloned());
        matched.sort();
        matched.dedup();
        let matched: Vec<String> = matched.into_iter().filter(|k| regex.is_match(k)).collect();
        let count = matched.len() as u64;
        for key in &matched {
            state.scalars.remove(key);
            state.lists.remove(key);
            state.sets.remove(key);
            state.hashes.remove(key);
            state.zsets.remove(key);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[tokio::test]
    async fn get_evicts_expired_entries() {
        let cache = MemoryCache::new();
        cache.set("k", serde_json::json!("v"), Some(0)).await;
        sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn incr_creates_counter_at_zero() {
        let cache = MemoryCache::new();
        assert_eq!(cache.incr("count", 3).await, 3);
        assert_eq!(cache.incr("count", 2).await, 5);
    }

    #[tokio::test]
    async fn append_trims_to_cap() {
        let cache = MemoryCache::new();
        for i in 0..5 {
            cache.append("log", serde_json::json!(i), 3).await;
        }
        let values = cache.get_array("log", 10).await;
        assert_eq!(values, vec![serde_json::json!(2), serde_json::json!(3), serde_json::json!(4)]);
    }

    #[tokio::test]
    async fn flush_removes_only_matching_keys() {
        let cache = MemoryCache::new();
        cache.set("cache:user:1", serde_json::json!(1), None).await;
        cache.set("cache:session:1", serde_json::json!(1), None).await;
        let removed = cache.flush("cache:user:*").await.unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get("cache:user:1").await.is_none());
        assert!(cache.get("cache:session:1").await.is_some());
    }

    #[tokio::test]
    async fn flush_all_clears_everything() {
        let cache = MemoryCache::new();
        cache.set("a", serde_json::json!(1), None).await;
        cache.set("b", serde_json::json!(2), None).await;
        let removed = cache.flush_all().await.unwrap();
        assert_eq!(removed, 2);
    }
}
