//! Turns a popped batch into handler calls. Ungrouped events are dispatched
//! one at a time; each group is dispatched once with the whole list it
//! collected — the "five comments become one email" contract from §4.7.

use std::sync::Arc;

use crate::app::App;
use crate::event::model::Event;
use crate::event::store::EventStore;
use crate::jobs::Priority;

/// The Handler Registry name `process_events` runs under. `App::configure`
/// registers it against this exact name, and `queue_ready_events` enqueues
/// the popped batch against it — the two ends of the job-routing contract
/// from §2/§4.6 (a popped batch is handed to the Job Dispatcher as one job,
/// never processed inline on the ticker).
pub const PROCESS_EVENTS_HANDLER: &str = "event:process_events";

#[derive(Debug, Default, Clone, Copy)]
pub struct EventService;

impl EventService {
    pub fn new() -> Self {
        Self
    }

    /// Pops whatever is ripe right now and hands the whole batch to the Job
    /// Dispatcher as one `Normal`-priority job, rather than processing it
    /// inline. Called from the periodic driver's event tick; a caller that
    /// wants the non-reentrancy guard applies it around this call, not
    /// inside it — this method itself has no opinion on concurrent
    /// invocation.
    pub async fn queue_ready_events(&self, app: &Arc<App>) {
        let events = app.events.pop_ready_events().await;
        if events.is_empty() {
            return;
        }
        let payload = serde_json::to_value(&events).unwrap_or(serde_json::Value::Null);
        if let Err(e) = app.jobs.add(PROCESS_EVENTS_HANDLER, payload, Priority::Normal, None).await {
            tracing::error!("failed to enqueue popped event batch: {e}");
        }
    }

    /// Partitions by group and dispatches each partition through the
    /// handler registry. A handler name that doesn't resolve is logged and
    /// skipped — not fatal, per the handler-resolution error taxonomy.
    pub async fn process_events(&self, app: &Arc<App>, events: Vec<Event>) {
        let (ungrouped, grouped) = EventStore::partition_by_group(events);

        for event in ungrouped {
            let payload = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
            self.dispatch(app, &event.handler, payload).await;
        }

        for (_group_key, group_events) in grouped {
            let Some(handler) = group_events.first().map(|e| e.handler.clone()) else {
                continue;
            };
            let payload = serde_json::to_value(&group_events).unwrap_or(serde_json::Value::Null);
            self.dispatch(app, &handler, payload).await;
        }
    }

    async fn dispatch(&self, app: &Arc<App>, handler_name: &str, payload: serde_json::Value) {
        match app.registry.get(handler_name) {
            Some(handler) => handler(app.clone(), payload).await,
            None => tracing::warn!("no handler registered for '{handler_name}', skipping"),
        }
    }
}
