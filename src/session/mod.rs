//! Per-session status ledger, quota tracking, and cleanup.
//!
//! All per-session state lives in the blob store under the `{session_id}/`
//! key prefix, so any process can serve any session and restarts lose
//! nothing. Within one process, [`SessionLocks`] serializes state
//! transitions for the same session id.

mod quota;
mod reaper;
mod status;

pub use quota::QuotaTracker;
pub use reaper::SessionReaper;
pub use status::{SessionStatus, StatusFields, StatusLedger, StatusRecord};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map of per-session async locks.
///
/// Overlapping requests for the same session (a re-upload while a question
/// is mid-flight) take the same lock; requests for different sessions never
/// contend.
#[derive(Default)]
pub struct SessionLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    /// Create an empty lock map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a session, creating it on first use.
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
