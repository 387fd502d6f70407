//! Pending credential hand-off
//!
//! The fill-trigger flow stages the credential the user picked; the engine
//! consumes it on the next qualifying screen. A stale credential is dropped
//! by a deferred compare-and-clear so a newer one is never clobbered.

use crate::platform::Scheduler;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// A credential staged for the next fillable screen
#[derive(Debug, Clone)]
pub struct PendingCredential {
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// URI of the screen the user was on when picking the credential
    pub last_uri: String,
    pub captured_at: DateTime<Utc>,
}

impl PendingCredential {
    pub fn new(
        username: Option<String>,
        password: Option<SecretString>,
        last_uri: impl Into<String>,
    ) -> Self {
        Self {
            username,
            password,
            last_uri: last_uri.into(),
            captured_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    credential: Option<PendingCredential>,
    /// Bumped on every `set`
    version: u64,
}

/// Shared holder. Clones refer to the same slot.
#[derive(Debug, Clone, Default)]
pub struct PendingCredentialHolder {
    inner: Arc<Mutex<Slot>>,
}

impl PendingCredentialHolder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // The slot holds plain data, a panic mid-update cannot break it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stage a credential, replacing any previous one. Returns its version.
    pub fn set(&self, credential: PendingCredential) -> u64 {
        let mut slot = self.lock();
        slot.version += 1;
        slot.credential = Some(credential);
        debug!("Pending credential staged (version {})", slot.version);
        slot.version
    }

    /// Current credential together with the version it was staged under
    pub fn snapshot(&self) -> (Option<PendingCredential>, u64) {
        let slot = self.lock();
        (slot.credential.clone(), slot.version)
    }

    pub fn peek(&self) -> Option<PendingCredential> {
        self.lock().credential.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.lock().credential.is_some()
    }

    pub fn take(&self) -> Option<PendingCredential> {
        self.lock().credential.take()
    }

    pub fn clear(&self) {
        self.lock().credential = None;
    }

    /// Clear only if nothing was staged since `version` was observed.
    /// Returns true if a credential was removed.
    pub fn clear_if_unchanged(&self, version: u64) -> bool {
        let mut slot = self.lock();
        if slot.version != version {
            debug!(
                "Skipping pending clear: version {} superseded by {}",
                version, slot.version
            );
            return false;
        }
        slot.credential.take().is_some()
    }

    /// Schedule a compare-and-clear of the credential staged under `version`
    pub fn schedule_clear(&self, scheduler: &dyn Scheduler, delay: Duration, version: u64) {
        let holder = self.clone();
        scheduler.schedule(
            delay,
            Box::new(move || {
                if holder.clear_if_unchanged(version) {
                    debug!("Stale pending credential cleared");
                }
            }),
        );
    }
}
