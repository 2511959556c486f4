use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::cache::Cache;
use crate::error::ReactorError;

/// Every operation is a no-op. Used where a pipeline must run without
/// actually caching anything — tests that assert on handler behaviour
/// without caring about cache state, or an embedding app that hasn't wired
/// up Redis yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

#[async_trait]
impl Cache for NullCache {
    async fn set(&self, _key: &str, _value: serde_json::Value, _ttl_seconds: Option<u64>) {}

    async fn get(&self, _key: &str) -> Option<serde_json::Value> {
        None
    }

    async fn get_int(&self, _key: &str) -> i64 {
        0
    }

    async fn get_array(&self, _key: &str, _n: usize) -> Vec<serde_json::Value> {
        vec![]
    }

    async fn get_multi(&self, keys: &[String]) -> HashMap<String, Option<serde_json::Value>> {
        keys.iter().map(|k| (k.clone(), None)).collect()
    }

    async fn incr(&self, _key: &str, _by: i64) -> i64 {
        0
    }

    async fn decr(&self, _key: &str, _by: i64) -> i64 {
        0
    }

    async fn prepend(&self, _key: &str, _value: serde_json::Value, _cap: usize) {}

    async fn append(&self, _key: &str, _value: serde_json::Value, _cap: usize) {}

    async fn unique_add(&self, _set: &str, _value: serde_json::Value) {}

    async fn get_unique_set(&self, _set: &str) -> HashSet<String> {
        HashSet::new()
    }

    async fn set_hash(&self, _key: &str, _field: &str, _value: serde_json::Value) {}

    async fn get_hash(&self, _key: &str, _field: &str) -> Option<serde_json::Value> {
        None
    }

    async fn get_all_hashes(&self, _key: &str) -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }

    async fn get_hash_size(&self, _key: &str) -> u64 {
        0
    }

    async fn delete_hash_key(&self, _key: &str, _field: &str) {}

    async fn set_zset(&self, _key: &str, _score: f64, _member: String) {}

    async fn get_zrange_by_score(&self, _key: &str, _min: f64, _max: f64) -> Vec<String> {
        vec![]
    }

    async fn del_zrange_by_score(&self, _key: &str, _min: f64, _max: f64) {}

    async fn remove(&self, _keys: &[String]) {}

    async fn flush(&self, _pattern: &str) -> Result<u64, ReactorError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_multi_maps_every_key_to_none() {
        let cache = NullCache;
        let result = cache.get_multi(&["a".to_string(), "b".to_string()]).await;
        assert_eq!(result.get("a"), Some(&None));
        assert_eq!(result.get("b"), Some(&None));
    }

    #[tokio::test]
    async fn set_then_get_stays_a_miss() {
        let cache = NullCache;
        cache.set("k", serde_json::json!(1), None).await;
        assert_eq!(cache.get("k").await, None);
    }
}
