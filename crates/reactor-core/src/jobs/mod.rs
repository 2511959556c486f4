//! Job dispatcher: enqueues work onto one of three priority-named Redis
//! lists, or (in `Immediate` mode) runs it synchronously through the
//! [`HandlerRegistry`](crate::registry::HandlerRegistry).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::distributions::{Alphanumeric, DistString};
use serde::{Deserialize, Serialize};

use crate::error::ReactorError;
use crate::kv::KvStore;
use crate::registry::HandlerRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    fn queue_key(self) -> &'static str {
        match self {
            Priority::High => "jobs:high",
            Priority::Normal => "jobs:normal",
            Priority::Low => "jobs:low",
        }
    }
}

/// A 6-character alphanumeric id, generated client-side at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    fn generate() -> Self {
        Self(Alphanumeric.sample_string(&mut rand::thread_rng(), 6))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobRecord {
    id: JobId,
    target: String,
    payload: serde_json::Value,
    depends_on: Option<JobId>,
    enqueued_at: chrono::DateTime<Utc>,
}

#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn add(
        &self,
        target: &str,
        payload: serde_json::Value,
        priority: Priority,
        depends_on: Option<JobId>,
    ) -> Result<JobId, ReactorError>;
}

/// Enqueues onto the priority-named Redis list. At-least-once: a storage
/// failure is returned to the caller, not retried here.
pub struct RedisJobDispatcher {
    kv: Arc<dyn KvStore>,
}

impl RedisJobDispatcher {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl JobDispatcher for RedisJobDispatcher {
    async fn add(
        &self,
        target: &str,
        payload: serde_json::Value,
        priority: Priority,
        depends_on: Option<JobId>,
    ) -> Result<JobId, ReactorError> {
        let id = JobId::generate();
        let record = JobRecord {
            id: id.clone(),
            target: target.to_string(),
            payload,
            depends_on,
            enqueued_at: Utc::now(),
        };
        let encoded = serde_json::to_string(&record)?;
        self.kv.rpush(priority.queue_key(), encoded).await?;
        Ok(id)
    }
}

/// Runs the target handler directly on the calling task instead of
/// enqueueing. Used in tests and single-process development where a worker
/// pool draining Redis lists would be overkill.
///
/// Holds a [`Weak`](std::sync::Weak) back-reference rather than an `Arc`:
/// the dispatcher lives inside the very [`App`](crate::app::App) it needs to
/// invoke handlers against, and an `Arc` cycle there would leak the app
/// forever.
pub struct ImmediateJobDispatcher {
    app: std::sync::Weak<crate::app::App>,
}

impl ImmediateJobDispatcher {
    pub fn new(app: std::sync::Weak<crate::app::App>) -> Self {
        Self { app }
    }
}

#[async_trait]
impl JobDispatcher for ImmediateJobDispatcher {
    async fn add(
        &self,
        target: &str,
        payload: serde_json::Value,
        _priority: Priority,
        _depends_on: Option<JobId>,
    ) -> Result<JobId, ReactorError> {
        let id = JobId::generate();
        let Some(app) = self.app.upgrade() else {
            tracing::error!("immediate job dispatch: app has already been dropped");
            return Ok(id);
        };
        if let Some(handler) = HandlerRegistry::lookup(&app.registry, target) {
            handler(app, payload).await;
        } else {
            tracing::warn!("immediate job dispatch: no handler registered for {target}");
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::fake::FakeKv;

    #[tokio::test]
    async fn redis_dispatcher_pushes_onto_priority_queue() {
        let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
        let dispatcher = RedisJobDispatcher::new(kv.clone());
        let id = dispatcher
            .add("notif.send", serde_json::json!({"to": "x"}), Priority::High, None)
            .await
            .unwrap();
        assert_eq!(id.0.len(), 6);

        let queued = kv.lrange("jobs:high", 0, -1).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert!(queued[0].contains(&id.0));
    }

    #[tokio::test]
    async fn each_priority_uses_a_distinct_queue() {
        assert_eq!(Priority::High.queue_key(), "jobs:high");
        assert_eq!(Priority::Normal.queue_key(), "jobs:normal");
        assert_eq!(Priority::Low.queue_key(), "jobs:low");
    }

    #[test]
    fn job_id_is_six_characters() {
        let id = JobId::generate();
        assert_eq!(id.0.len(), 6);
        assert!(id.0.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
