//! Maps a dotted handler name (`"notif.digest"`, `"cron:cleanup_sessions"`)
//! to the async closure that runs it. Both event handlers and cron task
//! bodies are resolved through this one table, replacing the dynamic
//! `getattr` dispatch a singleton-application design would otherwise need.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::app::App;

pub type Handler = Arc<dyn Fn(Arc<App>, serde_json::Value) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, overwriting any previous
    /// registration — last registration for a name wins, so an embedding
    /// application can override an example handler by re-registering it.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(Arc<App>, serde_json::Value) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).cloned()
    }

    /// Free function wrapper so callers holding only `&HandlerRegistry`
    /// don't need a method-call-through-Option dance at the call site.
    pub fn lookup(registry: &HandlerRegistry, name: &str) -> Option<Handler> {
        registry.get(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn unregistered_handler_resolves_to_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn registered_handler_runs_when_invoked() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();
        let calls_clone = calls.clone();
        registry.register("notif.digest", move |_app, _payload| {
            let calls = calls_clone.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        });

        let handler = registry.get("notif.digest").expect("handler registered above");
        let app = crate::app::App::configure(crate::config::Settings::default(), HandlerRegistry::new())
            .await
            .expect("in-memory app always configures");
        handler(app, serde_json::json!({})).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn re_registering_a_name_overwrites_the_previous_handler() {
        let mut registry = HandlerRegistry::new();
        registry.register("x", |_app, _payload| Box::pin(async {}));
        assert_eq!(registry.len(), 1);
        registry.register("x", |_app, _payload| Box::pin(async {}));
        assert_eq!(registry.len(), 1);
    }
}
