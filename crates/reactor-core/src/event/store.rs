use std::collections::HashMap;
use std::sync::Arc;

use crate::event::model::{group_key, Event, EventBuilder, PersistedEvent};
use crate::kv::KvStore;

const EVENTS_KEY: &str = "event";

/// Owns the `event` sorted set and its `event:group:*` coalescing keys.
pub struct EventStore {
    kv: Arc<dyn KvStore>,
}

impl EventStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Creates and persists an event, coalescing it into an existing group
    /// window when `group_by` is set and a window is already open.
    ///
    /// Failures writing the group key or the sorted-set member are logged
    /// and swallowed: the caller always gets back the `Event` it asked for,
    /// with the score it would have been stored under.
    pub async fn create_event(
        &self,
        handler: &str,
        data: serde_json::Value,
        ready_after: i64,
        group_by: Option<&str>,
    ) -> Event {
        let now = self.kv.server_time().await.unwrap_or_else(|_| chrono::Utc::now());
        let mut event = EventBuilder::new()
            .handler(handler)
            .data(data)
            .ready_after(ready_after)
            .build(now)
            .expect("all three required fields are set above");

        let score = match group_by {
            Some(group_by) => {
                let key = group_key(group_by, handler, ready_after);
                let score = match self.kv.get(&key).await {
                    Ok(Some(raw)) => raw.parse::<f64>().ok(),
                    _ => None,
                };
                let score = score.unwrap_or_else(|| now.timestamp() as f64 + ready_after as f64);
                if let Err(e) = self.kv.set(&key, score.to_string()).await {
                    tracing::error!("failed to persist event group key {key}: {e}");
                }
                event.group = Some(key);
                score
            }
            None => now.timestamp() as f64 + ready_after as f64,
        };

        let payload = match serde_json::to_string(&PersistedEvent { event: &event, score }) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("failed to encode event for {handler}: {e}");
                return event;
            }
        };

        if let Err(e) = self.kv.zadd(EVENTS_KEY, score, payload).await {
            tracing::error!("failed to enqueue event for {handler}: {e}");
        }

        event
    }

    /// Atomically pops every event whose score has elapsed and clears the
    /// group keys it observed. Never fails outward: a pipeline error yields
    /// an empty batch.
    pub async fn pop_ready_events(&self) -> Vec<Event> {
        let now = self
            .kv
            .server_time()
            .await
            .map(|t| t.timestamp() as f64)
            .unwrap_or_else(|_| chrono::Utc::now().timestamp() as f64);

        let raw = match self.kv.pop_range_by_score(EVENTS_KEY, 0.0, now).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!("failed to pop ready events: {e}");
                return vec![];
            }
        };

        let mut events = Vec::with_capacity(raw.len());
        let mut groups_seen = Vec::new();
        for payload in raw {
            match serde_json::from_str::<Event>(&payload) {
                Ok(event) => {
                    if let Some(group) = &event.group {
                        groups_seen.push(group.clone());
                    }
                    events.push(event);
                }
                Err(e) => tracing::error!("failed to decode popped event: {e}"),
            }
        }

        if !groups_seen.is_empty() {
            groups_seen.sort();
            groups_seen.dedup();
            if let Err(e) = self.kv.del(&groups_seen).await {
                tracing::error!("failed to clear event group keys: {e}");
            }
        }

        events
    }

    /// Partitions a popped batch by group: ungrouped events are processed
    /// one-by-one, each named group is processed once with every event it
    /// collected.
    pub fn partition_by_group(events: Vec<Event>) -> (Vec<Event>, HashMap<String, Vec<Event>>) {
        let mut ungrouped = Vec::new();
        let mut grouped: HashMap<String, Vec<Event>> = HashMap::new();
        for event in events {
            match &event.group {
                Some(group) => grouped.entry(group.clone()).or_default().push(event),
                None => ungrouped.push(event),
            }
        }
        (ungrouped, grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::fake::FakeKv;

    fn store() -> EventStore {
        EventStore::new(Arc::new(FakeKv::new()))
    }

    #[tokio::test]
    async fn create_event_round_trips_through_pop() {
        let store = store();
        store
            .create_event("notif.digest", serde_json::json!({"id": 1}), 0, None)
            .await;

        let popped = store.pop_ready_events().await;
        assert_eq!(popped.len(), 1);
        assert_eq!(popped[0].handler, "notif.digest");
    }

    #[tokio::test]
    async fn persisted_member_carries_score_on_the_wire() {
        let kv = Arc::new(FakeKv::new());
        let store = EventStore::new(kv.clone());
        store
            .create_event("notif.digest", serde_json::json!({"id": 1}), 60, None)
            .await;

        let raw = kv.zrangebyscore(EVENTS_KEY, 0.0, f64::MAX).await.unwrap();
        assert_eq!(raw.len(), 1);
        let json: serde_json::Value = serde_json::from_str(&raw[0]).unwrap();
        assert!(json.get("score").is_some(), "wire payload must include score per §6");
        assert_eq!(json["handler"], "notif.digest");
    }

    #[tokio::test]
    async fn popped_events_are_not_returned_twice() {
        let store = store();
        store
            .create_event("notif.digest", serde_json::json!({}), 0, None)
            .await;
        let first = store.pop_ready_events().await;
        let second = store.pop_ready_events().await;
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn grouped_events_share_a_score() {
        let store = store();
        let first = store
            .create_event("notif.digest", serde_json::json!({"c": 1}), 300, Some("user:1"))
            .await;
        let second = store
            .create_event("notif.digest", serde_json::json!({"c": 2}), 300, Some("user:1"))
            .await;
        assert_eq!(first.group, second.group);
    }

    #[tokio::test]
    async fn not_ready_events_stay_in_the_store() {
        let store = store();
        store
            .create_event("notif.digest", serde_json::json!({}), 3_600, None)
            .await;
        let popped = store.pop_ready_events().await;
        assert!(popped.is_empty());
    }

    #[test]
    fn partition_groups_distinct_events_separately() {
        let a = Event {
            handler: "h".into(),
            data: serde_json::json!({}),
            ready_after: 0,
            created_at: chrono::Utc::now(),
            group: None,
        };
        let mut b = a.clone();
        b.group = Some("event:group:x".to_string());
        let mut c = a.clone();
        c.group = Some("event:group:x".to_string());

        let (ungrouped, grouped) = EventStore::partition_by_group(vec![a, b, c]);
        assert_eq!(ungrouped.len(), 1);
        assert_eq!(grouped.get("event:group:x").map(Vec::len), Some(2));
    }
}
