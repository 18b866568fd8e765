use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{DistancePatch, DistanceStore, JobFilter, JobPatch, JobStore, UserDirectory};
use crate::auth::Role;
use crate::error::StoreError;
use crate::state_machine::{DistanceRecord, Job, JobId, JobStatus, User, UserId};

/// Serializable image of everything the store holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub next_id: JobId,
    #[serde(default)]
    pub jobs: BTreeMap<JobId, Job>,
    #[serde(default)]
    pub distances: BTreeMap<JobId, DistanceRecord>,
    #[serde(default)]
    pub users: BTreeMap<UserId, User>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            next_id: 1,
            jobs: BTreeMap::new(),
            distances: BTreeMap::new(),
            users: BTreeMap::new(),
        }
    }
}

/// Thread-safe store backed by a single `RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Snapshot>,
}

impl InMemoryStore {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(mut snapshot: Snapshot) -> Self {
        let max_id = snapshot.jobs.keys().next_back().copied().unwrap_or(0);
        snapshot.next_id = snapshot.next_id.max(max_id + 1);
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> Result<Snapshot, StoreError> {
        Ok(self.inner.read()?.clone())
    }

    /// Replaces everything held with `snapshot`.
    pub fn restore(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        *self.inner.write()? = snapshot;
        Ok(())
    }

    pub fn add_user(&self, user: User) -> Result<(), StoreError> {
        self.inner.write()?.users.insert(user.id, user);
        Ok(())
    }

    /// Stores `job` under its own id, replacing whatever was there.
    #[cfg(test)]
    pub fn put_job(&self, job: Job) -> Result<(), StoreError> {
        let mut inner = self.inner.write()?;
        inner.next_id = inner.next_id.max(job.id + 1);
        inner.jobs.insert(job.id, job);
        Ok(())
    }
}

impl JobStore for InMemoryStore {
    fn insert(&self, mut job: Job) -> Result<Job, StoreError> {
        let mut inner = self.inner.write()?;
        job.id = inner.next_id;
        inner.next_id += 1;
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn find(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.inner.read()?.jobs.get(&id).cloned())
    }

    fn compare_and_set_status(
        &self,
        id: JobId,
        expected: JobStatus,
        next: &Job,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write()?;
        match inner.jobs.get_mut(&id) {
            Some(current) if current.status == expected => {
                *current = next.clone();
                current.id = id;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn patch(&self, id: JobId, patch: &JobPatch) -> Result<Option<Job>, StoreError> {
        let mut inner = self.inner.write()?;
        Ok(inner.jobs.get_mut(&id).map(|job| {
            patch.apply_to(job, Utc::now());
            job.clone()
        }))
    }

    fn query(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.read()?;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| filter.matches(j))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| (j.scheduled_due_at, j.id));
        Ok(jobs)
    }
}

impl DistanceStore for InMemoryStore {
    fn distance(&self, job_id: JobId) -> Result<Option<DistanceRecord>, StoreError> {
        Ok(self.inner.read()?.distances.get(&job_id).cloned())
    }

    fn upsert_distance(
        &self,
        job_id: JobId,
        patch: &DistancePatch,
    ) -> Result<DistanceRecord, StoreError> {
        let now = Utc::now();
        let mut inner = self.inner.write()?;
        let record = inner
            .distances
            .entry(job_id)
            .or_insert_with(|| DistanceRecord::new(job_id, now));
        patch.apply_to(record, now);
        Ok(record.clone())
    }
}

impl UserDirectory for InMemoryStore {
    fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read()?.users.get(&id).cloned())
    }

    fn users_with_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        Ok(self
            .inner
            .read()?
            .users
            .values()
            .filter(|u| u.role == role)
            .cloned()
            .collect())
    }
}
