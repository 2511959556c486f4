//! The one shared context every component receives explicitly. Replaces a
//! bare mutable global singleton with an `Arc<App>` that can't be read
//! before it exists.

use std::sync::Arc;

use crate::cache::{Cache, MemoryCache, NullCache, RedisCache};
use crate::config::{CacheBackend, Env, JobsBackend, Settings};
use crate::cron::Scheduler;
use crate::error::ReactorError;
use crate::event::{Event, EventService, EventStore, PROCESS_EVENTS_HANDLER};
use crate::jobs::{ImmediateJobDispatcher, JobDispatcher, RedisJobDispatcher};
use crate::kv::{FakeKv, KvStore, RedisKv};
use crate::registry::HandlerRegistry;

pub struct App {
    pub settings: Settings,
    pub kv: Arc<dyn KvStore>,
    pub events: EventStore,
    pub cache: Arc<dyn Cache>,
    pub jobs: Arc<dyn JobDispatcher>,
    pub scheduler: Scheduler,
    pub registry: HandlerRegistry,
}

impl App {
    /// The one constructor. `Env::Test` never opens a real Redis connection
    /// — it runs entirely against in-memory backends, so unit and
    /// integration tests never need a live store.
    ///
    /// Takes the fully-populated [`HandlerRegistry`] up front rather than
    /// exposing a post-construction `register` method: the registry is
    /// read-only for the lifetime of the `Arc<App>`, and an embedder always
    /// knows its whole handler set before it starts the driver.
    ///
    /// Registers the internal `event:process_events` handler into `registry`
    /// before it's sealed into the `App`, so that wherever the Job
    /// Dispatcher ends up running a job targeting it (inline in `Immediate`
    /// mode, or on whatever worker drains `jobs:normal` in `Redis` mode) it
    /// resolves to `EventService::process_events`. This registration always
    /// wins over anything an embedder registered under the same name — it's
    /// the wiring the event pipeline depends on, not an example handler.
    pub async fn configure(settings: Settings, mut registry: HandlerRegistry) -> Result<Arc<App>, ReactorError> {
        registry.register(PROCESS_EVENTS_HANDLER, |app, payload| {
            Box::pin(async move {
                match serde_json::from_value::<Vec<Event>>(payload) {
                    Ok(events) => EventService::new().process_events(&app, events).await,
                    Err(e) => tracing::error!("failed to decode popped event batch payload: {e}"),
                }
            })
        });

        let kv: Arc<dyn KvStore> = if settings.env == Env::Test {
            Arc::new(FakeKv::new())
        } else {
            Arc::new(RedisKv::connect(&settings.redis.connection_url()).await?)
        };

        let cache: Arc<dyn Cache> = match settings.cache.backend {
            CacheBackend::Redis => Arc::new(RedisCache::new(kv.clone())),
            CacheBackend::Memory => Arc::new(MemoryCache::new()),
            CacheBackend::Null => Arc::new(NullCache),
        };

        let events = EventStore::new(kv.clone());
        let scheduler = Scheduler::new(kv.clone(), settings.cron.tasks.clone());

        Ok(Arc::new_cyclic(|weak: &std::sync::Weak<App>| {
            let jobs: Arc<dyn JobDispatcher> = match settings.jobs.backend {
                JobsBackend::Redis => Arc::new(RedisJobDispatcher::new(kv.clone())),
                JobsBackend::Immediate => Arc::new(ImmediateJobDispatcher::new(weak.clone())),
            };

            App {
                settings,
                kv,
                events,
                cache,
                jobs,
                scheduler,
                registry,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_env_configures_without_a_live_redis() {
        let app = App::configure(Settings::default(), HandlerRegistry::new()).await;
        assert!(app.is_ok());
    }

    #[tokio::test]
    async fn immediate_dispatcher_can_reach_back_into_its_own_app() {
        let mut settings = Settings::default();
        settings.jobs.backend = JobsBackend::Immediate;
        let app = App::configure(settings, HandlerRegistry::new()).await.unwrap();
        let id = app.jobs.add("noop", serde_json::json!({}), crate::jobs::Priority::Normal, None).await.unwrap();
        assert_eq!(id.0.len(), 6);
    }

    #[tokio::test]
    async fn registered_handlers_survive_into_the_built_app() {
        let mut registry = HandlerRegistry::new();
        registry.register("noop", |_app, _payload| Box::pin(async {}));
        let app = App::configure(Settings::default(), registry).await.unwrap();
        assert!(app.registry.get("noop").is_some());
    }

    #[tokio::test]
    async fn process_events_handler_is_always_registered() {
        let app = App::configure(Settings::default(), HandlerRegistry::new()).await.unwrap();
        assert!(app.registry.get(PROCESS_EVENTS_HANDLER).is_some());
    }
}
