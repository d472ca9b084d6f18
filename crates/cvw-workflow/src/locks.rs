//! Per-project mutual exclusion
//!
//! One async mutex per project id. Requests on the same project queue behind
//! each other; different projects never contend.

use crate::types::ProjectId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-project async mutexes
#[derive(Debug, Default)]
pub struct ProjectLocks {
    locks: DashMap<ProjectId, Arc<Mutex<()>>>,
}

impl ProjectLocks {
    /// Empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `project_id`.
    pub async fn lock(&self, project_id: ProjectId) -> OwnedMutexGuard<()> {
        // Clone the Arc out before awaiting so no shard lock is held.
        let mutex = self
            .locks
            .entry(project_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drop entries nobody holds or waits on.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before - self.locks.len()
    }

    /// Number of tracked projects
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True when no project is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
