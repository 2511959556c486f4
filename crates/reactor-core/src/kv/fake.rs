//! In-memory [`KvStore`] used by this crate's own test suites so they never
//! need a live Redis. Not behind `#[cfg(test)]` because it is also useful to
//! downstream crates writing integration tests against [`App`](crate::app::App).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ReactorError;
use crate::kv::{KvStore, LockHandle};

#[derive(Default)]
struct State {
    strings: HashMap<String, String>,
    zsets: HashMap<String, Vec<(String, f64)>>,
    sets: HashMap<String, Vec<String>>,
    lists: HashMap<String, Vec<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    locks: HashMap<String, String>,
}

/// Deterministic, single-process stand-in for Redis.
pub struct FakeKv {
    state: Mutex<State>,
}

impl FakeKv {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }
}

impl Default for FakeKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for FakeKv {
    async fn get(&self, key: &str) -> Result<Option<String>, ReactorError> {
        Ok(self.state.lock().unwrap().strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), ReactorError> {
        self.state.lock().unwrap().strings.insert(key.to_string(), value);
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: String, _ttl_seconds: u64) -> Result<(), ReactorError> {
        self.set(key, value).await
    }

    async fn del(&self, keys: &[String]) -> Result<(), ReactorError> {
        let mut state = self.state.lock().unwrap();
        for key in keys {
            state.strings.remove(key);
            state.zsets.remove(key);
            state.sets.remove(key);
            state.lists.remove(key);
            state.hashes.remove(key);
        }
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, ReactorError> {
        let state = self.state.lock().unwrap();
        Ok(keys.iter().map(|k| state.strings.get(k).cloned()).collect())
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, ReactorError> {
        let mut state = self.state.lock().unwrap();
        let entry = state.strings.entry(key.to_string()).or_insert_with(|| "0".to_string());
        let next = entry.parse::<i64>().unwrap_or(0) + delta;
        *entry = next.to_string();
        Ok(next)
    }

    async fn zadd(&self, key: &str, score: f64, member: String) -> Result<(), ReactorError> {
        let mut state = self.state.lock().unwrap();
        let set = state.zsets.entry(key.to_string()).or_default();
        set.retain(|(m, _)| m != &member);
        set.push((member, score));
        Ok(())
    }

    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>, ReactorError> {
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
        Ok(members.into_iter().map(|(m, _)| m).collect())
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<u64, ReactorError> {
        let mut state = self.state.lock().unwrap();
        if let Some(set) = state.zsets.get_mut(key) {
            let before = set.len();
            set.retain(|(_, score)| !(*score >= min && *score <= max));
            Ok((before - set.len()) as u64)
        } else {
            Ok(0)
        }
    }

    async fn pop_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>, ReactorError> {
        let mut state = self.state.lock().unwrap();
        let set = state.zsets.entry(key.to_string()).or_default();
        let mut matched: Vec<_> = set
            .iter()
            .filter(|(_, score)| *score >= min && *score <= max)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        set.retain(|(_, score)| !(*score >= min && *score <= max));
        Ok(matched.into_iter().map(|(m, _)| m).collect())
    }

    async fn sadd(&self, key: &str, member: String) -> Result<(), ReactorError> {
        let mut state = self.state.lock().unwrap();
        let set = state.sets.entry(key.to_string()).or_default();
        if !set.contains(&member) {
            set.push(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, ReactorError> {
        Ok(self.state.lock().unwrap().sets.get(key).cloned().unwrap_or_default())
    }

    async fn lpush(&self, key: &str, value: String) -> Result<(), ReactorError> {
        let mut state = self.state.lock().unwrap();
        state.lists.entry(key.to_string()).or_default().insert(0, value);
        Ok(())
    }

    async fn rpush(&self, key: &str, value: String) -> Result<(), ReactorError> {
        let mut state = self.state.lock().unwrap();
        state.lists.entry(key.to_string()).or_default().push(value);
        Ok(())
    }

    async fn push_and_trim(
        &self,
        key: &str,
        value: String,
        cap: isize,
        front: bool,
    ) -> Result<(), ReactorError> {
        let mut state = self.state.lock().unwrap();
        let list = state.lists.entry(key.to_string()).or_default();
        if front {
            list.insert(0, value);
        } else {
            list.push(value);
        }
        let cap = cap.max(0) as usize;
        list.truncate(cap);
        Ok(())
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, ReactorError> {
        let state = self.state.lock().unwrap();
        let list = match state.lists.get(key) {
            Some(list) => list,
            None => return Ok(vec![]),
        };
        Ok(slice_range(list, start, stop))
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), ReactorError> {
        let mut state = self.state.lock().unwrap();
        if let Some(list) = state.lists.get_mut(key) {
            *list = slice_range(list, start, stop);
        }
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: String) -> Result<(), ReactorError> {
        let mut state = self.state.lock().unwrap();
        state
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, ReactorError> {
        let state = self.state.lock().unwrap();
        Ok(state.hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, ReactorError> {
        Ok(self.state.lock().unwrap().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hlen(&self, key: &str) -> Result<u64, ReactorError> {
        Ok(self.state.lock().unwrap().hashes.get(key).map(|h| h.len()).unwrap_or(0) as u64)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), ReactorError> {
        let mut state = self.state.lock().unwrap();
        if let Some(h) = state.hashes.get_mut(key) {
            h.remove(field);
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, ReactorError> {
        let regex = crate::cache::pattern_to_regex(pattern);
        let state = self.state.lock().unwrap();
        let mut all: Vec<String> = state.strings.keys().cloned().collect();
        all.extend(state.hashes.keys().cloned());
        all.extend(state.lists.keys().cloned());
        all.extend(state.sets.keys().cloned());
        all.extend(state.zsets.keys().cloned());
        all.sort();
        all.dedup();
        Ok(all.into_iter().filter(|k| regex.is_match(k)).collect())
    }

    async fn server_time(&self) -> Result<DateTime<Utc>, ReactorError> {
        Ok(Utc::now())
    }

    async fn try_acquire_lock(
        &self,
        name: &str,
        _ttl: Duration,
    ) -> Result<Option<LockHandle>, ReactorError> {
        let mut state = self.state.lock().unwrap();
        if state.locks.contains_key(name) {
            return Ok(None);
        }
        let token = uuid::Uuid::new_v4().to_string();
        state.locks.insert(name.to_string(), token.clone());
        Ok(Some(LockHandle {
            name: name.to_string(),
            token,
        }))
    }

    async fn release_lock(&self, handle: &LockHandle) -> Result<(), ReactorError> {
        let mut state = self.state.lock().unwrap();
        if state.locks.get(&handle.name) == Some(&handle.token) {
            state.locks.remove(&handle.name);
        }
        Ok(())
    }
}

fn slice_range(list: &[String], start: isize, stop: isize) -> Vec<String> {
    let len = list.len() as isize;
    if len == 0 {
        return vec![];
    }
    let norm = |i: isize| -> isize {
        if i < 0 {
            (len + i).max(0)
        } else {
            i.min(len - 1).max(0)
        }
    };
    let start = norm(start);
    let stop = norm(stop);
    if start > stop {
        return vec![];
    }
    list[start as usize..=stop as usize].to_vec()
}
