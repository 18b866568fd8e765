use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{
    DistancePatch, DistanceStore, InMemoryStore, JobFilter, JobPatch, JobStore, Snapshot,
    UserDirectory,
};
use crate::auth::Role;
use crate::error::StoreError;
use crate::state_machine::{DistanceRecord, Job, JobId, JobStatus, User, UserId};

/// [`InMemoryStore`] that rewrites a JSON snapshot after every mutation.
pub struct JsonFileStore {
    inner: InMemoryStore,
    path: PathBuf,
    flush: Mutex<()>,
}

impl JsonFileStore {
    /// Opens `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str::<Snapshot>(&contents)?
        } else {
            Snapshot::default()
        };
        tracing::debug!(path = %path.display(), jobs = snapshot.jobs.len(), "opened job store");
        Ok(Self {
            inner: InMemoryStore::from_snapshot(snapshot),
            path,
            flush: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add_user(&self, user: User) -> Result<(), StoreError> {
        self.write(|inner| inner.add_user(user).map(|()| ((), true)))
    }

    /// Runs `op` against the memory image and writes the file when `op`
    /// reports a change. A failed write puts the previous image back so
    /// memory never runs ahead of disk.
    fn write<T>(
        &self,
        op: impl FnOnce(&InMemoryStore) -> Result<(T, bool), StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self.flush.lock()?;
        let before = self.inner.snapshot()?;
        let (out, changed) = op(&self.inner)?;
        if changed && let Err(err) = self.persist() {
            tracing::warn!(path = %self.path.display(), error = %err, "write failed, rolling back");
            self.inner.restore(before)?;
            return Err(err);
        }
        Ok(out)
    }

    fn persist(&self) -> Result<(), StoreError> {
        let snapshot = self.inner.snapshot()?;
        let json = serde_json::to_vec_pretty(&snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl JobStore for JsonFileStore {
    fn insert(&self, job: Job) -> Result<Job, StoreError> {
        self.write(|inner| inner.insert(job).map(|job| (job, true)))
    }

    fn find(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        self.inner.find(id)
    }

    fn compare_and_set_status(
        &self,
        id: JobId,
        expected: JobStatus,
        next: &Job,
    ) -> Result<bool, StoreError> {
        self.write(|inner| {
            inner
                .compare_and_set_status(id, expected, next)
                .map(|swapped| (swapped, swapped))
        })
    }

    fn patch(&self, id: JobId, patch: &JobPatch) -> Result<Option<Job>, StoreError> {
        self.write(|inner| {
            inner.patch(id, patch).map(|job| {
                let changed = job.is_some();
                (job, changed)
            })
        })
    }

    fn query(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        self.inner.query(filter)
    }
}

impl DistanceStore for JsonFileStore {
    fn distance(&self, job_id: JobId) -> Result<Option<DistanceRecord>, StoreError> {
        self.inner.distance(job_id)
    }

    fn upsert_distance(
        &self,
        job_id: JobId,
        patch: &DistancePatch,
    ) -> Result<DistanceRecord, StoreError> {
        self.write(|inner| inner.upsert_distance(job_id, patch).map(|record| (record, true)))
    }
}

impl UserDirectory for JsonFileStore {
    fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.inner.user(id)
    }

    fn users_with_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        self.inner.users_with_role(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::JobSpec;
    use chrono::{Duration, Utc};

    fn new_job() -> Job {
        let now = Utc::now();
        Job::new(
            1,
            JobSpec {
                from_language: "sv".into(),
                duration_min: 60,
                ..Default::default()
            },
            now + Duration::hours(3),
            now,
        )
    }

    #[test]
    fn mutations_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");

        let store = JsonFileStore::open(&path).unwrap();
        let job = store.insert(new_job()).unwrap();
        store
            .upsert_distance(
                job.id,
                &DistancePatch {
                    distance: Some("7".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).unwrap();
        let loaded = reopened.find(job.id).unwrap().unwrap();
        assert_eq!(loaded.from_language, "sv");
        assert_eq!(
            reopened.distance(job.id).unwrap().unwrap().distance.as_deref(),
            Some("7")
        );
        assert_eq!(reopened.insert(new_job()).unwrap().id, job.id + 1);
    }

    #[test]
    fn failed_compare_and_set_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let store = JsonFileStore::open(&path).unwrap();
        let job = store.insert(new_job()).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let mut next = job.clone();
        next.status = JobStatus::Expired;
        assert!(!store.compare_and_set_status(job.id, JobStatus::Pending, &next).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn failed_write_rolls_memory_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let store = JsonFileStore::open(&path).unwrap();
        let job = store.insert(new_job()).unwrap();

        // A directory in place of the temp file makes the write fail.
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap();

        assert!(matches!(store.insert(new_job()), Err(StoreError::Io(_))));
        assert_eq!(store.query(&JobFilter::default()).unwrap().len(), 1);

        let mut next = job.clone();
        next.status = JobStatus::Expired;
        assert!(store.compare_and_set_status(job.id, JobStatus::Pending, &next).is_err());
        assert_eq!(store.find(job.id).unwrap().unwrap().status, JobStatus::Pending);

        let patch = DistancePatch {
            distance: Some("7".into()),
            ..Default::default()
        };
        assert!(store.upsert_distance(job.id, &patch).is_err());
        assert!(store.distance(job.id).unwrap().is_none());

        std::fs::remove_dir(path.with_extension("json.tmp")).unwrap();
        assert_eq!(store.insert(new_job()).unwrap().id, job.id + 1);
    }

    #[test]
    fn open_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(StoreError::Json(_))));
    }
}
