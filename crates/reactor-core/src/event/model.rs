use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single deferred event. Constructed via [`EventBuilder`] so the three
/// required fields can never be missing by the time one reaches the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub handler: String,
    pub data: serde_json::Value,
    pub ready_after: i64,
    pub created_at: DateTime<Utc>,
    /// The group key this event was coalesced under, if any. Carried on the
    /// wire so a popped batch can be partitioned by group without a second
    /// lookup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

#[derive(Debug, Default)]
pub struct EventBuilder {
    handler: Option<String>,
    data: Option<serde_json::Value>,
    ready_after: Option<i64>,
}

impl EventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn ready_after(mut self, seconds: i64) -> Self {
        self.ready_after = Some(seconds);
        self
    }

    /// Builds the event with the given creation timestamp. `group` is filled
    /// in separately by the store once the group key (if any) is known.
    pub fn build(self, created_at: DateTime<Utc>) -> Result<Event, String> {
        let handler = self.handler.ok_or("event requires a handler")?;
        let data = self.data.ok_or("event requires data")?;
        let ready_after = self.ready_after.ok_or("event requires ready_after")?;
        Ok(Event {
            handler,
            data,
            ready_after,
            created_at,
            group: None,
        })
    }
}

/// Builds the group key string shared by every event in a coalescing
/// window: `event:group:{group_by}-{handler}-{ready_after}`.
pub fn group_key(group_by: &str, handler: &str, ready_after: i64) -> String {
    format!("event:group:{group_by}-{handler}-{ready_after}")
}

/// The `event` zset member's wire shape: every `Event` field plus the
/// `score` it was stored under, per §6's `{handler, ready_after, data,
/// group?, created_at, score}` sorted-set member format. `score` is
/// recomputed at pop time from the zset key itself, so `Event` doesn't need
/// to carry it for the Rust-side round-trip — this wrapper exists only so
/// an external reader of the raw zset payload finds `score` in it.
#[derive(Debug, Serialize)]
pub struct PersistedEvent<'a> {
    #[serde(flatten)]
    pub event: &'a Event,
    pub score: f64,
}
