//! Persistence seams for jobs, distance records and users.
//!
//! The engine only talks to these traits. [`InMemoryStore`] is the
//! reference implementation; [`JsonFileStore`] adds durability on top of it.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::{InMemoryStore, Snapshot};

use chrono::{DateTime, Utc};

use crate::auth::Role;
use crate::error::StoreError;
use crate::state_machine::{DistanceRecord, Job, JobId, JobStatus, SessionTime, User, UserId};

pub trait JobStore: Send + Sync {
    /// Stores a new job and returns it with its assigned id.
    fn insert(&self, job: Job) -> Result<Job, StoreError>;

    fn find(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Replaces the stored job with `next` only if its status is still
    /// `expected`. Check and write happen as one step.
    fn compare_and_set_status(
        &self,
        id: JobId,
        expected: JobStatus,
        next: &Job,
    ) -> Result<bool, StoreError>;

    /// Applies a field-level update without touching the status.
    fn patch(&self, id: JobId, patch: &JobPatch) -> Result<Option<Job>, StoreError>;

    /// Jobs matching `filter`, ordered by due time then id.
    fn query(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError>;
}

pub trait DistanceStore: Send + Sync {
    fn distance(&self, job_id: JobId) -> Result<Option<DistanceRecord>, StoreError>;

    /// Creates the record on first use; applies only the fields present in `patch`.
    fn upsert_distance(
        &self,
        job_id: JobId,
        patch: &DistancePatch,
    ) -> Result<DistanceRecord, StoreError>;
}

pub trait UserDirectory: Send + Sync {
    fn user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    fn users_with_role(&self, role: Role) -> Result<Vec<User>, StoreError>;
}

/// Everything the lifecycle engine needs from persistence.
pub trait Repository: JobStore + DistanceStore + UserDirectory {}

impl<T: JobStore + DistanceStore + UserDirectory> Repository for T {}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Empty means any status.
    pub statuses: Vec<JobStatus>,
    pub customer_id: Option<UserId>,
    pub translator_id: Option<UserId>,
    /// Matches jobs where the user is either the customer or the translator.
    pub involving: Option<UserId>,
    pub language: Option<String>,
    pub flagged: Option<bool>,
    pub due_before: Option<DateTime<Utc>>,
}

impl JobFilter {
    pub fn with_statuses(statuses: &[JobStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Default::default()
        }
    }

    pub fn matches(&self, job: &Job) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&job.status))
            && self.customer_id.is_none_or(|id| job.customer_id == id)
            && self.translator_id.is_none_or(|id| job.translator_id == Some(id))
            && self.involving.is_none_or(|id| job.involves(id))
            && self
                .language
                .as_deref()
                .is_none_or(|l| job.from_language.eq_ignore_ascii_case(l))
            && self.flagged.is_none_or(|f| job.flagged == f)
            && self.due_before.is_none_or(|t| job.scheduled_due_at <= t)
    }
}

/// Field-level update of a job; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub admin_comments: Option<String>,
    pub flagged: Option<bool>,
    pub manually_handled: Option<bool>,
    pub by_admin: Option<bool>,
    pub session_time: Option<SessionTime>,
    pub scheduled_due_at: Option<DateTime<Utc>>,
    pub will_expire_at: Option<DateTime<Utc>>,
    pub from_language: Option<String>,
    pub duration_min: Option<u32>,
    pub instructions: Option<String>,
    pub user_email: Option<String>,
    pub reference: Option<String>,
    pub address: Option<String>,
    /// Marks the customer as a no-show at the given time.
    pub customer_not_call_at: Option<DateTime<Utc>>,
    pub expiry_alert_sent: Option<bool>,
}

impl JobPatch {
    pub fn is_empty(&self) -> bool {
        *self == JobPatch::default()
    }

    pub fn apply_to(&self, job: &mut Job, now: DateTime<Utc>) {
        if let Some(v) = &self.admin_comments {
            job.admin_comments = v.clone();
        }
        if let Some(v) = self.flagged {
            job.flagged = v;
        }
        if let Some(v) = self.manually_handled {
            job.manually_handled = v;
        }
        if let Some(v) = self.by_admin {
            job.by_admin = v;
        }
        if let Some(v) = self.session_time {
            job.session_time = Some(v);
        }
        if let Some(v) = self.scheduled_due_at {
            job.scheduled_due_at = v;
        }
        if let Some(v) = self.will_expire_at {
            job.will_expire_at = v;
        }
        if let Some(v) = &self.from_language {
            job.from_language = v.clone();
        }
        if let Some(v) = self.duration_min {
            job.duration_min = v;
        }
        if let Some(v) = &self.instructions {
            job.instructions = v.clone();
        }
        if let Some(v) = &self.user_email {
            job.user_email = Some(v.clone());
        }
        if let Some(v) = &self.reference {
            job.reference = Some(v.clone());
        }
        if let Some(v) = &self.address {
            job.address = Some(v.clone());
        }
        if let Some(at) = self.customer_not_call_at {
            job.customer_not_call = true;
            job.customer_not_call_at = Some(at);
        }
        if let Some(v) = self.expiry_alert_sent {
            job.expiry_alert_sent = v;
        }
        job.updated_at = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistancePatch {
    pub distance: Option<String>,
    pub time: Option<String>,
    pub session_time: Option<SessionTime>,
}

impl DistancePatch {
    pub fn is_empty(&self) -> bool {
        self.distance.is_none() && self.time.is_none() && self.session_time.is_none()
    }

    pub fn apply_to(&self, record: &mut DistanceRecord, now: DateTime<Utc>) {
        if let Some(v) = &self.distance {
            record.distance = Some(v.clone());
        }
        if let Some(v) = &self.time {
            record.time = Some(v.clone());
        }
        if let Some(v) = self.session_time {
            record.session_time = Some(v);
        }
        record.updated_at = now;
    }
}
