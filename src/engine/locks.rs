use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::state_machine::JobId;

/// One async mutex per job id; unrelated jobs never wait on each other.
#[derive(Debug, Default, Clone)]
pub struct JobLocks {
    inner: Arc<DashMap<JobId, Arc<Mutex<()>>>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `job_id`. Released when the guard drops.
    pub async fn acquire(&self, job_id: JobId) -> OwnedMutexGuard<()> {
        // The map shard guard must be gone before we await.
        let lock = Arc::clone(self.inner.entry(job_id).or_default().value());
        lock.lock_owned().await
    }

    /// Forgets locks nobody holds or waits on.
    pub fn prune(&self) {
        self.inner.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}
