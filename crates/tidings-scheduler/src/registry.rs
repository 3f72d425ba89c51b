//! Job registry — the authoritative set of scheduled jobs per thread.
//!
//! Invariants:
//! - At most one active job set per thread: `start` clears every job whose id
//!   is the thread id (interval) or starts with `"{thread_id}_"` (daily)
//!   before registering the new set, so an edit can never leave a stale job
//!   alive alongside a new one.
//! - `stop` is idempotent — stopping a never-started thread is a no-op.
//! - `update` is stop-then-start, a wholesale rebuild, never a diff.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tidings_core::thread::{ScheduleSpec, Thread};
use tidings_core::{Result, TidingsError};

use crate::engine::JobFire;
use crate::store::JobStore;
use crate::trigger::{self, FireRule};

/// Why a gathering execution fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    IntervalMode,
    DailyMode,
    ManualRun,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IntervalMode => write!(f, "interval_mode"),
            Self::DailyMode => write!(f, "daily_mode"),
            Self::ManualRun => write!(f, "manual_run"),
        }
    }
}

/// A registered recurring job, derived from a thread's schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// `thread_id` for interval jobs, `thread_id_HHMM` for daily jobs.
    pub id: String,
    pub thread_id: String,
    pub trigger_kind: TriggerKind,
    pub rule: FireRule,
    /// The thread definition this job will execute. Replaced wholesale on
    /// every update, and cloned into a snapshot at fire time.
    pub thread: Thread,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Status row surfaced by the scheduler-status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: String,
    pub thread_id: String,
    pub trigger_kind: TriggerKind,
    pub timezone: String,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: u32,
    pub in_flight: usize,
}

/// The registry. Callers hold it behind one async mutex — job-set mutations
/// for a given thread must not interleave.
pub struct JobRegistry {
    jobs: Vec<ScheduledJob>,
    /// In-flight execution count per job id (max_instances cap).
    active: std::collections::HashMap<String, usize>,
    store: Box<dyn JobStore>,
    max_instances: usize,
}

impl JobRegistry {
    /// Load the registry from its store. Stale next-run times (the process
    /// was down when they matured) are advanced — a missed fire runs on the
    /// next tick rather than being dropped, but never fires into the past.
    pub fn new(store: Box<dyn JobStore>, max_instances: usize) -> Result<Self> {
        let jobs = store.load()?;
        let mut registry = Self {
            jobs,
            active: std::collections::HashMap::new(),
            store,
            max_instances: max_instances.max(1),
        };
        for job in registry.jobs.iter_mut() {
            if job.next_run.is_none() {
                job.next_run = job.rule.next_after(Utc::now());
            }
        }
        tracing::info!("📅 Job registry loaded: {} job(s)", registry.jobs.len());
        Ok(registry)
    }

    /// Register the job set for a thread, replacing any previous set.
    ///
    /// Returns the registered job ids. A thread without a schedule registers
    /// nothing — the caller runs it once, immediately.
    pub fn start(&mut self, thread: &Thread) -> Result<Vec<String>> {
        let cleared = self.clear_thread_jobs(&thread.thread_id);
        if cleared > 0 {
            tracing::info!(
                "🧹 Cleared {cleared} old job(s) for thread {}",
                thread.thread_id
            );
        }

        let Some(spec) = &thread.schedule else {
            self.store.save(&self.jobs)?;
            return Ok(Vec::new());
        };

        let now = Utc::now();
        let rules = trigger::resolve(spec, now);
        let mut registered = Vec::with_capacity(rules.len());

        for rule in rules {
            let (id, kind) = match &rule {
                FireRule::Interval { .. } => {
                    (thread.thread_id.clone(), TriggerKind::IntervalMode)
                }
                FireRule::DailyAt { time, .. } => (
                    format!("{}_{}", thread.thread_id, time.hhmm()),
                    TriggerKind::DailyMode,
                ),
            };
            let next_run = rule.next_after(now);
            let job = ScheduledJob {
                id: id.clone(),
                thread_id: thread.thread_id.clone(),
                trigger_kind: kind,
                rule,
                thread: Thread { running: true, ..thread.clone() },
                next_run,
                last_run: None,
                run_count: 0,
                created_at: now,
            };
            // Replace-existing: a duplicate id never accumulates two firing paths.
            self.jobs.retain(|j| j.id != id);
            tracing::info!(
                "📅 Job registered: {id} ({kind}) next run {next}",
                kind = job.trigger_kind,
                next = job
                    .next_run
                    .map(|n| n.to_rfc3339())
                    .unwrap_or_else(|| "never".into()),
            );
            self.jobs.push(job);
            registered.push(id);
        }

        self.store.save(&self.jobs)?;
        self.store.set_running(&thread.thread_id, true)?;
        Ok(registered)
    }

    /// Remove all jobs for a thread. Idempotent.
    pub fn stop(&mut self, thread_id: &str) -> Result<usize> {
        let removed = self.clear_thread_jobs(thread_id);
        if removed > 0 {
            tracing::info!("🛑 Stopped thread {thread_id}: removed {removed} job(s)");
        }
        self.store.save(&self.jobs)?;
        self.store.set_running(thread_id, false)?;
        Ok(removed)
    }

    /// Rebuild a thread's job set from its current definition.
    pub fn update(&mut self, thread: &Thread) -> Result<Vec<String>> {
        self.stop(&thread.thread_id)?;
        self.start(thread)
    }

    /// Collect fires that are due at `now`, advancing each job by exactly one
    /// occurrence. A backlog of missed fires is therefore worked off one per
    /// tick, not collapsed into a single run.
    pub fn due_fires(&mut self, now: DateTime<Utc>) -> Vec<JobFire> {
        let mut fires = Vec::new();
        for job in self.jobs.iter_mut() {
            let Some(next) = job.next_run else { continue };
            if next > now {
                continue;
            }
            let in_flight = *self.active.get(&job.id).unwrap_or(&0);
            if in_flight >= self.max_instances {
                tracing::warn!(
                    "⏸️ Job {} at max_instances ({in_flight}), deferring fire",
                    job.id
                );
                continue;
            }
            job.last_run = Some(now);
            job.run_count += 1;
            job.next_run = job.rule.next_after(next);
            *self.active.entry(job.id.clone()).or_insert(0) += 1;
            fires.push(JobFire {
                job_id: job.id.clone(),
                thread_id: job.thread_id.clone(),
                trigger_kind: job.trigger_kind,
                display_name: job.thread.display_name.clone(),
                // Full snapshot at fire time — concurrent edits replace the
                // registry's copy, never this one.
                snapshot: job.thread.clone(),
                fired_at: now,
            });
        }
        if !fires.is_empty()
            && let Err(e) = self.store.save(&self.jobs)
        {
            tracing::warn!("⚠️ Failed to persist job state after dispatch: {e}");
        }
        fires
    }

    /// Mark a dispatched fire finished (frees a max_instances slot).
    pub fn complete(&mut self, job_id: &str) {
        if let Some(count) = self.active.get_mut(job_id) {
            *count = count.saturating_sub(1);
        }
    }

    /// Jobs registered for a thread (exact or prefixed id match).
    pub fn jobs_for_thread(&self, thread_id: &str) -> Vec<&ScheduledJob> {
        self.jobs
            .iter()
            .filter(|j| Self::belongs_to(&j.id, thread_id))
            .collect()
    }

    /// Status of every registered job.
    pub fn status(&self) -> Vec<JobStatus> {
        self.jobs
            .iter()
            .map(|j| JobStatus {
                job_id: j.id.clone(),
                thread_id: j.thread_id.clone(),
                trigger_kind: j.trigger_kind,
                timezone: j.rule.timezone().to_string(),
                next_run: j.next_run,
                run_count: j.run_count,
                in_flight: *self.active.get(&j.id).unwrap_or(&0),
            })
            .collect()
    }

    /// Total registered jobs.
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the store marks a thread running.
    pub fn is_running(&self, thread_id: &str) -> Result<bool> {
        self.store.is_running(thread_id)
    }

    /// Validate that a schedule resolves to at least one rule (used by
    /// callers that want to reject a request before mutating anything).
    pub fn validate(spec: &ScheduleSpec) -> Result<()> {
        if trigger::resolve(spec, Utc::now()).is_empty() {
            return Err(TidingsError::Schedule(
                "Schedule resolves to no fire rules".into(),
            ));
        }
        Ok(())
    }

    fn clear_thread_jobs(&mut self, thread_id: &str) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|j| !Self::belongs_to(&j.id, thread_id));
        before - self.jobs.len()
    }

    fn belongs_to(job_id: &str, thread_id: &str) -> bool {
        job_id == thread_id || job_id.starts_with(&format!("{thread_id}_"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryJobStore;
    use tidings_core::thread::{ContentBlock, BlockMode, IntervalUnit, TimeOfDay};

    fn daily_thread(id: &str, times: &[(u32, u32)]) -> Thread {
        Thread {
            thread_id: id.into(),
            user_id: "u1".into(),
            email: "u1@example.com".into(),
            display_name: "Test".into(),
            schedule: Some(ScheduleSpec::Daily {
                times: times
                    .iter()
                    .map(|&(hour, minute)| TimeOfDay { hour, minute })
                    .collect(),
                timezone: chrono_tz::UTC,
            }),
            blocks: vec![ContentBlock::GeneralSearch {
                query: "rust".into(),
                mode: BlockMode::Selective,
            }],
            running: false,
        }
    }

    fn interval_thread(id: &str) -> Thread {
        Thread {
            schedule: Some(ScheduleSpec::Interval {
                unit: IntervalUnit::Minutes,
                every: 30,
                start_time: TimeOfDay { hour: 0, minute: 0 },
                timezone: chrono_tz::UTC,
            }),
            ..daily_thread(id, &[])
        }
    }

    fn registry() -> JobRegistry {
        JobRegistry::new(Box::new(MemoryJobStore::new()), 3).unwrap()
    }

    #[test]
    fn test_daily_registers_one_job_per_time() {
        let mut reg = registry();
        let ids = reg.start(&daily_thread("t1", &[(9, 0), (21, 30)])).unwrap();
        assert_eq!(ids, vec!["t1_0900", "t1_2130"]);
        assert_eq!(reg.job_count(), 2);
        assert!(reg.is_running("t1").unwrap());
    }

    #[test]
    fn test_double_start_replaces_not_accumulates() {
        let mut reg = registry();
        reg.start(&daily_thread("t1", &[(9, 0), (21, 30)])).unwrap();
        reg.start(&daily_thread("t1", &[(9, 0), (21, 30)])).unwrap();
        assert_eq!(reg.job_count(), 2);
    }

    #[test]
    fn test_update_drops_removed_times() {
        let mut reg = registry();
        reg.start(&daily_thread("t1", &[(9, 0), (21, 30)])).unwrap();
        let ids = reg.update(&daily_thread("t1", &[(7, 15)])).unwrap();
        assert_eq!(ids, vec!["t1_0715"]);
        assert_eq!(reg.job_count(), 1);
    }

    #[test]
    fn test_stop_removes_only_that_thread() {
        let mut reg = registry();
        reg.start(&daily_thread("t1", &[(9, 0), (21, 30)])).unwrap();
        reg.start(&daily_thread("t2", &[(9, 0)])).unwrap();
        let removed = reg.stop("t1").unwrap();
        assert_eq!(removed, 2);
        assert_eq!(reg.job_count(), 1);
        assert_eq!(reg.jobs_for_thread("t2").len(), 1);
    }

    #[test]
    fn test_stop_does_not_touch_prefix_collisions() {
        // "t1" must not clear jobs of thread "t10".
        let mut reg = registry();
        reg.start(&daily_thread("t10", &[(9, 0)])).unwrap();
        let removed = reg.stop("t1").unwrap();
        assert_eq!(removed, 0);
        assert_eq!(reg.job_count(), 1);
    }

    #[test]
    fn test_stop_never_started_is_noop() {
        let mut reg = registry();
        let removed = reg.stop("ghost").unwrap();
        assert_eq!(removed, 0);
        assert!(!reg.is_running("ghost").unwrap());
    }

    #[test]
    fn test_interval_uses_bare_thread_id() {
        let mut reg = registry();
        let ids = reg.start(&interval_thread("t1")).unwrap();
        assert_eq!(ids, vec!["t1"]);
    }

    #[test]
    fn test_scheduleless_thread_registers_nothing() {
        let mut reg = registry();
        let mut thread = daily_thread("t1", &[(9, 0)]);
        thread.schedule = None;
        let ids = reg.start(&thread).unwrap();
        assert!(ids.is_empty());
        assert_eq!(reg.job_count(), 0);
    }

    #[test]
    fn test_due_fires_advance_and_snapshot() {
        let mut reg = registry();
        reg.start(&interval_thread("t1")).unwrap();
        // Force the job due.
        let now = Utc::now();
        reg.jobs[0].next_run = Some(now - chrono::Duration::seconds(1));

        let fires = reg.due_fires(now);
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].thread_id, "t1");
        assert_eq!(fires[0].trigger_kind, TriggerKind::IntervalMode);
        assert_eq!(fires[0].snapshot.blocks.len(), 1);
        // next_run advanced past the fired occurrence.
        assert!(reg.jobs[0].next_run.unwrap() > now - chrono::Duration::seconds(1));
        assert_eq!(reg.jobs[0].run_count, 1);
    }

    #[test]
    fn test_max_instances_defers_fire() {
        let mut reg = JobRegistry::new(Box::new(MemoryJobStore::new()), 1).unwrap();
        reg.start(&interval_thread("t1")).unwrap();
        let now = Utc::now();
        reg.jobs[0].next_run = Some(now - chrono::Duration::seconds(1));

        let fires = reg.due_fires(now);
        assert_eq!(fires.len(), 1);

        // Still in flight; a due fire is deferred, not dropped.
        reg.jobs[0].next_run = Some(now);
        assert!(reg.due_fires(now).is_empty());

        reg.complete("t1");
        assert_eq!(reg.due_fires(now + chrono::Duration::seconds(1)).len(), 1);
    }

    #[test]
    fn test_registry_reload_from_store() {
        let store = MemoryJobStore::new();
        {
            let mut reg = JobRegistry::new(Box::new(store.clone()), 3).unwrap();
            reg.start(&daily_thread("t1", &[(9, 0)])).unwrap();
        }
        let reg = JobRegistry::new(Box::new(store), 3).unwrap();
        assert_eq!(reg.job_count(), 1);
        assert_eq!(reg.status()[0].job_id, "t1_0900");
    }
}
