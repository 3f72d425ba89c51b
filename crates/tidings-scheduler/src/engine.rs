//! Scheduler engine — the tick loop that fires due jobs onto a bounded
//! worker pool.
//!
//! The registry mutex is held only to collect due fires and to mark
//! completions; the work itself — including anything slow like on-chain
//! payment verification — runs on its own tokio task behind a semaphore, so
//! the dispatch loop never blocks on a worker.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Semaphore};

use tidings_core::Result;
use tidings_core::thread::Thread;

use crate::registry::{JobRegistry, TriggerKind};

/// One matured fire, ready for execution.
#[derive(Debug, Clone)]
pub struct JobFire {
    pub job_id: String,
    pub thread_id: String,
    pub trigger_kind: TriggerKind,
    pub display_name: String,
    /// Full thread definition captured at fire time. Edits made while this
    /// run is in flight replace the registry's copy, not this one.
    pub snapshot: Thread,
    pub fired_at: DateTime<Utc>,
}

impl JobFire {
    /// A synthetic fire for scheduleless threads (run once, immediately).
    pub fn manual(thread: &Thread) -> Self {
        Self {
            job_id: thread.thread_id.clone(),
            thread_id: thread.thread_id.clone(),
            trigger_kind: TriggerKind::ManualRun,
            display_name: thread.display_name.clone(),
            snapshot: thread.clone(),
            fired_at: Utc::now(),
        }
    }
}

/// Execution seam: the gathering executor implements this.
#[async_trait]
pub trait FireHandler: Send + Sync {
    async fn handle(&self, fire: JobFire) -> Result<()>;
}

/// Run the scheduler loop until the process exits.
///
/// Every `tick_secs` the registry is asked for due fires; each fire runs on
/// its own task, gated by a `workers`-wide semaphore. Handler errors are
/// logged at the dispatch boundary — they never take the loop down.
pub async fn spawn_scheduler(
    registry: Arc<Mutex<JobRegistry>>,
    handler: Arc<dyn FireHandler>,
    tick_secs: u64,
    workers: usize,
) {
    tracing::info!("⏰ Scheduler started (tick {}s, {} workers)", tick_secs, workers);
    let pool = Arc::new(Semaphore::new(workers.max(1)));
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(tick_secs.max(1)));

    loop {
        interval.tick().await;

        let fires = {
            let mut reg = registry.lock().await;
            reg.due_fires(Utc::now())
        };

        for fire in fires {
            let permit = match pool.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => return, // semaphore closed — shutting down
            };
            let handler = handler.clone();
            let registry = registry.clone();
            tokio::spawn(async move {
                let job_id = fire.job_id.clone();
                tracing::info!(
                    "🔔 Job fired: {job_id} ({kind}) for '{name}'",
                    kind = fire.trigger_kind,
                    name = fire.display_name
                );
                if let Err(e) = handler.handle(fire).await {
                    tracing::error!("⚠️ Job {job_id} execution failed: {e}");
                }
                registry.lock().await.complete(&job_id);
                drop(permit);
            });
        }
    }
}

/// Execute a scheduleless thread once, synchronously with the caller.
pub async fn run_once(handler: &dyn FireHandler, thread: &Thread) -> Result<()> {
    handler.handle(JobFire::manual(thread)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryJobStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tidings_core::thread::{IntervalUnit, ScheduleSpec, TimeOfDay};

    struct Counter(AtomicUsize);

    #[async_trait]
    impl FireHandler for Counter {
        async fn handle(&self, _fire: JobFire) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn thread(id: &str) -> Thread {
        Thread {
            thread_id: id.into(),
            user_id: "u1".into(),
            email: String::new(),
            display_name: "T".into(),
            schedule: Some(ScheduleSpec::Interval {
                unit: IntervalUnit::Minutes,
                every: 5,
                start_time: TimeOfDay { hour: 0, minute: 0 },
                timezone: chrono_tz::UTC,
            }),
            blocks: Vec::new(),
            running: false,
        }
    }

    #[tokio::test]
    async fn test_run_once_invokes_handler() {
        let counter = Counter(AtomicUsize::new(0));
        let mut t = thread("t1");
        t.schedule = None;
        run_once(&counter, &t).await.unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_due_fire_dispatches_through_pool() {
        use crate::registry::ScheduledJob;
        use crate::store::JobStore;
        use crate::trigger::FireRule;

        // Seed the store with a job whose next run already matured, so the
        // test does not depend on the wall clock.
        let now = Utc::now();
        let store = MemoryJobStore::new();
        store
            .save(&[ScheduledJob {
                id: "t1".into(),
                thread_id: "t1".into(),
                trigger_kind: TriggerKind::IntervalMode,
                rule: FireRule::Interval {
                    anchor: now - chrono::Duration::minutes(5),
                    unit: IntervalUnit::Minutes,
                    every: 5,
                    timezone: chrono_tz::UTC,
                },
                thread: thread("t1"),
                next_run: Some(now - chrono::Duration::seconds(1)),
                last_run: None,
                run_count: 0,
                created_at: now,
            }])
            .unwrap();

        let registry = Arc::new(Mutex::new(
            JobRegistry::new(Box::new(store), 3).unwrap(),
        ));
        let handler = Arc::new(Counter(AtomicUsize::new(0)));

        // Drive one dispatch round by hand.
        let fires = registry.lock().await.due_fires(now);
        assert_eq!(fires.len(), 1);
        for fire in fires {
            handler.handle(fire).await.unwrap();
            registry.lock().await.complete("t1");
        }
        assert_eq!(handler.0.load(Ordering::SeqCst), 1);
    }
}
