//! Cooperative driver loop running the two tickers described in §4.6: event
//! poll and scheduler tick. Both fire onto the Tokio runtime via
//! `tokio::spawn` rather than blocking the `select!` below, so a slow store
//! round-trip on one tick never delays the other ticker's schedule.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::event::EventService;

/// Drives the event and cron tickers for the lifetime of the process. The
/// distilled spec's tickers have no cancellation at all; this one
/// concession — a `CancellationToken` selected alongside both tickers —
/// exists so the CLI binary can exit cleanly on `SIGINT` instead of being
/// killed mid-iteration.
pub struct PeriodicDriver {
    app: Arc<App>,
    events: EventService,
    event_tick_in_flight: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl PeriodicDriver {
    pub fn new(app: Arc<App>) -> Self {
        Self {
            app,
            events: EventService::new(),
            event_tick_in_flight: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        }
    }

    /// A clone of the token that stops [`run`](Self::run). Cancel it (e.g.
    /// from a `SIGINT` handler) to break the loop after its current
    /// iteration.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs both tickers until cancelled.
    pub async fn run(self) {
        let events_interval = Duration::from_millis(self.app.settings.events.polling_interval_ms);
        let cron_interval = Duration::from_millis(self.app.settings.cron.polling_interval_ms());

        let mut event_ticker = interval(events_interval.max(Duration::from_millis(1)));
        event_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cron_ticker = interval(cron_interval.max(Duration::from_millis(1)));
        cron_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = event_ticker.tick() => self.spawn_event_tick(),
                _ = cron_ticker.tick() => self.spawn_cron_tick(),
                _ = self.shutdown.cancelled() => {
                    tracing::info!("periodic driver shutting down");
                    break;
                }
            }
        }
    }

    /// Fires the event tick if no previous invocation is still in flight;
    /// otherwise the tick is dropped, not queued (§4.6). This is the guard
    /// against unbounded fan-out when the store is slow to answer.
    fn spawn_event_tick(&self) {
        if !self.try_begin_event_tick() {
            tracing::debug!("event tick skipped: previous poll still in flight");
            return;
        }
        let app = self.app.clone();
        let events = self.events;
        let in_flight = self.event_tick_in_flight.clone();
        tokio::spawn(async move {
            events.queue_ready_events(&app).await;
            in_flight.store(false, Ordering::SeqCst);
        });
    }

    fn spawn_cron_tick(&self) {
        let app = self.app.clone();
        tokio::spawn(async move {
            app.scheduler.check_scheduled_tasks(app.clone()).await;
        });
    }

    /// `true` if this call claimed the guard; `false` if another event tick
    /// already holds it. Exposed separately from `spawn_event_tick` so unit
    /// tests can exercise the reentrancy rule without waiting on real
    /// wall-clock tickers.
    fn try_begin_event_tick(&self) -> bool {
        !self.event_tick_in_flight.swap(true, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[tokio::test]
    async fn second_event_tick_is_dropped_while_first_is_in_flight() {
        let app = App::configure(Settings::default(), crate::registry::HandlerRegistry::new()).await.unwrap();
        let driver = PeriodicDriver::new(app);

        assert!(driver.try_begin_event_tick(), "first tick claims the guard");
        assert!(
            !driver.try_begin_event_tick(),
            "second tick must be dropped while the first is still in flight"
        );

        driver.event_tick_in_flight.store(false, Ordering::SeqCst);
        assert!(
            driver.try_begin_event_tick(),
            "guard releases once the in-flight tick finishes"
        );
    }

    #[tokio::test]
    async fn event_tick_processes_ripe_events_and_then_releases_guard() {
        let app = App::configure(Settings::default(), crate::registry::HandlerRegistry::new()).await.unwrap();
        app.events
            .create_event("notif.unused", serde_json::json!({}), 0, None)
            .await;

        let driver = PeriodicDriver::new(app.clone());
        driver.spawn_event_tick();
        // Single-threaded runtime: yield until the spawned task has run.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert!(
            driver.try_begin_event_tick(),
            "guard must be released once the spawned tick completes"
        );
    }

    #[tokio::test]
    async fn cancelling_the_shutdown_token_stops_the_run_loop() {
        let mut settings = Settings::default();
        settings.events.polling_interval_ms = 5;
        settings.cron.polling_interval_ms = Some(5);
        let app = App::configure(settings, crate::registry::HandlerRegistry::new()).await.unwrap();
        let driver = PeriodicDriver::new(app);
        let token = driver.shutdown_token();

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), driver.run())
            .await
            .expect("run() must return promptly once cancelled");
    }
}
