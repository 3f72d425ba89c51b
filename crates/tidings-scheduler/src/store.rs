//! Job store abstraction.
//!
//! The registry is injected with a store instead of owning a process-wide
//! map, so tests run against `MemoryJobStore` and deployments against
//! `SqliteJobStore` with identical semantics.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tidings_core::{Result, TidingsError};

use crate::registry::ScheduledJob;

/// Persistence seam for the job registry.
pub trait JobStore: Send + Sync {
    /// Persist the full job set (the registry always writes wholesale).
    fn save(&self, jobs: &[ScheduledJob]) -> Result<()>;
    /// Load the job set (empty on first run).
    fn load(&self) -> Result<Vec<ScheduledJob>>;
    /// Persist a thread's running flag.
    fn set_running(&self, thread_id: &str, running: bool) -> Result<()>;
    /// Read a thread's running flag (false when unknown).
    fn is_running(&self, thread_id: &str) -> Result<bool>;
}

/// In-memory store for tests.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    jobs: Vec<ScheduledJob>,
    running: HashMap<String, bool>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryJobStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|e| TidingsError::Store(format!("Lock: {e}")))
    }
}

impl JobStore for MemoryJobStore {
    fn save(&self, jobs: &[ScheduledJob]) -> Result<()> {
        self.lock()?.jobs = jobs.to_vec();
        Ok(())
    }

    fn load(&self) -> Result<Vec<ScheduledJob>> {
        Ok(self.lock()?.jobs.clone())
    }

    fn set_running(&self, thread_id: &str, running: bool) -> Result<()> {
        self.lock()?.running.insert(thread_id.to_string(), running);
        Ok(())
    }

    fn is_running(&self, thread_id: &str) -> Result<bool> {
        Ok(*self.lock()?.running.get(thread_id).unwrap_or(&false))
    }
}
