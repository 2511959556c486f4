use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Datelike, Timelike};
use futures_util::FutureExt;
use tokio::sync::Semaphore;

use crate::app::App;
use crate::cron::model::CronTaskDef;
use crate::kv::KvStore;

/// Evaluates the static cron table against Redis's wall clock, arbitrating
/// fires across replicas with per-task lease locks. Lock arbitration across
/// replicas is entirely Redis's: `try_acquire_lock`/`release_lock` compare
/// against the token on the wire, so each spawned task's closure carries
/// the one `LockHandle` that can release it — no process-local bookkeeping
/// of held locks is needed alongside that.
pub struct Scheduler {
    kv: Arc<dyn KvStore>,
    tasks: Vec<CronTaskDef>,
    permits: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(kv: Arc<dyn KvStore>, tasks: Vec<CronTaskDef>) -> Self {
        Self {
            kv,
            tasks,
            permits: Arc::new(Semaphore::new(num_cpus::get())),
        }
    }

    /// Runs one scheduler tick: fetch the store clock, test every task for
    /// readiness, and fire each ready task that this replica wins the lock
    /// for.
    pub async fn check_scheduled_tasks(&self, app: Arc<App>) {
        let now = match self.kv.server_time().await {
            Ok(now) => now,
            Err(e) => {
                tracing::error!("scheduler tick failed to read store time: {e}");
                return;
            }
        };

        let (month, day, hour, minute) = (
            now.month() as i64,
            now.day() as i64,
            now.hour() as i64,
            now.minute() as i64,
        );

        for task in &self.tasks {
            let Some(granularity) = task.granularity() else {
                tracing::error!("cron task {} has no schedule field set, skipping", task.name);
                continue;
            };

            let ready = task.month.is_ready(month)
                && task.day.is_ready(day)
                && task.hour.is_ready(hour)
                && task.minute.is_ready(minute);
            if !ready {
                continue;
            }

            let min_ttl = granularity.min_ttl_seconds();
            let lock_name = task.lock_name();
            let handle = match self
                .kv
                .try_acquire_lock(&lock_name, Duration::from_secs(min_ttl))
                .await
            {
                Ok(Some(handle)) => handle,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!("scheduler failed to acquire lock {lock_name}: {e}");
                    continue;
                }
            };

            let kv = self.kv.clone();
            let permits = self.permits.clone();
            let app = app.clone();
            let task = task.clone();

            tokio::spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };

                let started = Instant::now();
                let handler = app.registry.get(&task.handler);
                let args = task.args.clone();

                match handler {
                    Some(handler) => {
                        let result = AssertUnwindSafe(handler(app.clone(), args)).catch_unwind().await;
                        if result.is_err() {
                            tracing::error!("cron task {} panicked", task.name);
                        }
                    }
                    None => tracing::error!("cron task {} has no registered handler {}", task.name, task.handler),
                }

                let elapsed = started.elapsed();
                if elapsed >= Duration::from_secs(min_ttl) {
                    if let Err(e) = kv.release_lock(&handle).await {
                        tracing::error!("failed to release lock {}: {e}", handle.name);
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::model::ScheduleField;
    use crate::kv::fake::FakeKv;

    fn minute_task(name: &str, field: ScheduleField) -> CronTaskDef {
        CronTaskDef {
            name: name.to_string(),
            handler: "noop".to_string(),
            args: serde_json::json!({}),
            month: ScheduleField::Empty,
            day: ScheduleField::Empty,
            hour: ScheduleField::Empty,
            minute: field,
        }
    }

    #[tokio::test]
    async fn configuration_error_task_is_skipped_without_panicking() {
        let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
        let task = minute_task("broken", ScheduleField::Empty);
        let scheduler = Scheduler::new(kv.clone(), vec![task]);
        let app = App::configure(crate::config::Settings::default(), crate::registry::HandlerRegistry::new()).await.unwrap();
        scheduler.check_scheduled_tasks(app).await;
    }

    #[tokio::test]
    async fn ready_task_acquires_a_lock_named_after_it() {
        let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
        // "*/1" is trivially ready on any minute value, so this task always
        // fires on the first tick.
        let task = minute_task("heartbeat", ScheduleField::Every(1));
        let scheduler = Scheduler::new(kv.clone(), vec![task]);
        let app = App::configure(crate::config::Settings::default(), crate::registry::HandlerRegistry::new()).await.unwrap();
        scheduler.check_scheduled_tasks(app).await;
        tokio::task::yield_now().await;

        let locked = kv.try_acquire_lock("cron:heartbeat", Duration::from_secs(60)).await.unwrap();
        assert!(locked.is_none(), "lock should already be held by the fired task");
    }
}
