//! User profile lookup for gathering runs.
//!
//! A thread carries a `user_id` and an `email`; the profile store maps
//! either of them to the stored preferences that steer retrieval.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tidings_core::error::{Result, TidingsError};

/// Preferences attached to the user who owns a thread.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// Free-text description of what the user wants surfaced.
    #[serde(default)]
    pub content_preferences: String,
    /// X handles the user follows, without the leading `@`.
    #[serde(default)]
    pub x_usernames: Vec<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Lookup seam for user profiles.
///
/// Resolution order is by id first, then by email; callers fall back to
/// an empty profile when neither matches so a gather run never aborts
/// on a missing user record.
pub trait ProfileStore: Send + Sync {
    fn by_user_id(&self, user_id: &str) -> Result<Option<UserProfile>>;
    fn by_email(&self, email: &str) -> Result<Option<UserProfile>>;
}

/// In-memory profile store, used by tests and by deployments where the
/// user directory lives elsewhere and is synced in at startup.
#[derive(Clone, Default)]
pub struct MemoryProfileStore {
    inner: Arc<Mutex<ProfileInner>>,
}

#[derive(Default)]
struct ProfileInner {
    by_id: HashMap<String, UserProfile>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: &str, profile: UserProfile) -> Result<()> {
        self.lock()?.by_id.insert(user_id.to_string(), profile);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, ProfileInner>> {
        self.inner
            .lock()
            .map_err(|e| TidingsError::Gather(format!("Profile lock: {e}")))
    }
}

impl ProfileStore for MemoryProfileStore {
    fn by_user_id(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.lock()?.by_id.get(user_id).cloned())
    }

    fn by_email(&self, email: &str) -> Result<Option<UserProfile>> {
        let inner = self.lock()?;
        Ok(inner
            .by_id
            .values()
            .find(|p| !p.email.is_empty() && p.email == email)
            .cloned())
    }
}
