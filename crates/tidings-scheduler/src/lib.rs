//! # Tidings Scheduler
//!
//! Maps user-defined schedules (interval or daily, in arbitrary timezones)
//! onto concrete recurring job registrations with safe replace/cancel
//! semantics, then fires them on a bounded worker pool.
//!
//! ## Architecture
//! ```text
//! Thread { ScheduleSpec, blocks }
//!   └── trigger::resolve → FireRule(s), timezone-correct
//!         └── JobRegistry: one job per rule
//!               interval → id = thread_id
//!               daily    → id = thread_id_HHMM (one per time of day)
//!         └── engine loop (tokio interval)
//!               due job → snapshot → semaphore-bounded worker → FireHandler
//! ```
//!
//! The registry is the single source of truth for "what fires next"; every
//! mutation goes through one async mutex, and a thread's job set is always
//! cleared then re-added — never patched in place.

pub mod engine;
pub mod persistence;
pub mod registry;
pub mod store;
pub mod trigger;

pub use engine::{FireHandler, JobFire, run_once, spawn_scheduler};
pub use persistence::SqliteJobStore;
pub use registry::{JobRegistry, JobStatus, ScheduledJob, TriggerKind};
pub use store::{JobStore, MemoryJobStore};
pub use trigger::FireRule;
