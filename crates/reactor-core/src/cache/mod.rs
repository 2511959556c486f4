//! Caching layer with three interchangeable backends, all behind the same
//! `async_trait`. Keys passed to every method are bare (callers don't add
//! the `cache:` prefix themselves); backends that need a namespace add it.

mod memory_cache;
mod null_cache;
mod redis_cache;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::error::ReactorError;

pub use memory_cache::MemoryCache;
pub use null_cache::NullCache;
pub use redis_cache::RedisCache;

pub const CACHE_PREFIX: &str = "cache:";

#[async_trait]
pub trait Cache: Send + Sync {
    async fn set(&self, key: &str, value: serde_json::Value, ttl_seconds: Option<u64>);
    async fn get(&self, key: &str) -> Option<serde_json::Value>;
    async fn get_int(&self, key: &str) -> i64;
    async fn get_array(&self, key: &str, n: usize) -> Vec<serde_json::Value>;
    async fn get_multi(&self, keys: &[String]) -> HashMap<String, Option<serde_json::Value>>;
    async fn incr(&self, key: &str, by: i64) -> i64;
    async fn decr(&self, key: &str, by: i64) -> i64;
    async fn prepend(&self, key: &str, value: serde_json::Value, cap: usize);
    async fn append(&self, key: &str, value: serde_json::Value, cap: usize);
    async fn unique_add(&self, set: &str, value: serde_json::Value);
    async fn get_unique_set(&self, set: &str) -> HashSet<String>;
    async fn set_hash(&self, key: &str, field: &str, value: serde_json::Value);
    async fn get_hash(&self, key: &str, field: &str) -> Option<serde_json::Value>;
    async fn get_all_hashes(&self, key: &str) -> HashMap<String, serde_json::Value>;
    async fn get_hash_size(&self, key: &str) -> u64;
    async fn delete_hash_key(&self, key: &str, field: &str);
    async fn set_zset(&self, key: &str, score: f64, member: String);
    async fn get_zrange_by_score(&self, key: &str, min: f64, max: f64) -> Vec<String>;
    async fn del_zrange_by_score(&self, key: &str, min: f64, max: f64);
    async fn remove(&self, keys: &[String]);
    async fn flush(&self, pattern: &str) -> Result<u64, ReactorError>;
    async fn flush_all(&self) -> Result<u64, ReactorError> {
        self.flush("*").await
    }
}

/// Translates a `*`/`?`-glob into an anchored regex, escaping every literal
/// segment so a key containing regex metacharacters can't smuggle in an
/// unintended match.
pub fn pattern_to_regex(pattern: &str) -> regex::Regex {
    let mut anchored = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => anchored.push_str(".*"),
            '?' => anchored.push('.'),
            other => anchored.push_str(&regex::escape(&other.to_string())),
        }
    }
    anchored.push('$');
    regex::Regex::new(&anchored).expect("glob-derived pattern is always valid regex")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_to_regex_matches_prefix_glob() {
        let re = pattern_to_regex("cache:user:*");
        assert!(re.is_match("cache:user:42"));
        assert!(!re.is_match("cache:session:42"));
    }

    #[test]
    fn pattern_to_regex_escapes_literal_metacharacters() {
        let re = pattern_to_regex("cache:a.b*");
        assert!(re.is_match("cache:a.bc"));
        assert!(!re.is_match("cache:axbc"));
    }

    #[test]
    fn pattern_to_regex_full_wildcard_matches_everything() {
        let re = pattern_to_regex("*");
        assert!(re.is_match(""));
        assert!(re.is_match("anything"));
    }
}
