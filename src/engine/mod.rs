//! Booking lifecycle: every operation that changes a job goes through here.
//!
//! Each mutating call takes the per-job lock, reads the job, asks
//! [`StateMachine`] for the next record and commits it with a
//! compare-and-set on the status it read. Notifications are dispatched only
//! after the commit and never block the caller.

mod feed;
mod locks;
mod policy;

pub use feed::DistanceFeedRequest;
pub use policy::{DefaultEligibility, EligibilityPolicy};

use locks::JobLocks;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{Caller, Capability, Role};
use crate::config::LifecycleConfig;
use crate::error::BookingError;
use crate::notify::{
    Channel, ChannelSelector, Dispatcher, Notice, NoticeKind, Notifier, Recipient, RecipientRole,
    fan_out,
};
use crate::state_machine::{
    Action, DistanceRecord, Job, JobId, JobSpec, JobStatus, StateMachine, Transition, User, UserId,
    will_expire_at,
};
use crate::store::{JobFilter, JobPatch, Repository};

const HISTORY_PAGE_SIZE: usize = 15;

const OPEN_STATUSES: [JobStatus; 4] = [
    JobStatus::Created,
    JobStatus::Pending,
    JobStatus::Assigned,
    JobStatus::InProgress,
];

const CLOSED_STATUSES: [JobStatus; 3] = [
    JobStatus::Completed,
    JobStatus::Cancelled,
    JobStatus::Expired,
];

/// Request body for a new booking.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    #[serde(flatten)]
    pub spec: JobSpec,
    /// Required unless the booking is immediate.
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
}

/// Fields a customer or admin may change on an open booking.
///
/// Unknown fields (form tokens and the like) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BookingChanges {
    pub due_at: Option<DateTime<Utc>>,
    pub from_language: Option<String>,
    pub duration_min: Option<u32>,
    pub instructions: Option<String>,
}

/// Narrows the admin listing of all jobs.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<JobStatus>,
    pub language: Option<String>,
    pub flagged: Option<bool>,
    pub customer_id: Option<UserId>,
    pub translator_id: Option<UserId>,
}

impl From<ListFilter> for JobFilter {
    fn from(f: ListFilter) -> Self {
        JobFilter {
            statuses: f.status.into_iter().collect(),
            customer_id: f.customer_id,
            translator_id: f.translator_id,
            language: f.language.filter(|l| !l.trim().is_empty()),
            flagged: f.flagged,
            ..Default::default()
        }
    }
}

/// Contact details a customer attaches to a booking for its confirmation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobEmail {
    #[serde(alias = "jobid")]
    pub job_id: Option<JobId>,
    pub user_email: Option<String>,
    pub reference: Option<String>,
    pub address: Option<String>,
}

/// Open jobs of one user, immediate bookings listed apart.
#[derive(Debug, Clone, Serialize)]
pub struct UserJobs {
    pub user_id: UserId,
    pub immediate: Vec<Job>,
    pub normal: Vec<Job>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JobListing {
    User(UserJobs),
    All(Vec<Job>),
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub user_id: UserId,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub jobs: Vec<Job>,
}

/// A job with its assigned translator and distance record.
#[derive(Debug, Clone, Serialize)]
pub struct JobDetails {
    pub job: Job,
    pub translator: Option<User>,
    pub distance: Option<DistanceRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Acceptance {
    pub message: String,
    pub job: Job,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedOutcome {
    pub message: &'static str,
    pub distance: Option<DistanceRecord>,
    pub job: Option<Job>,
}

/// Result of a resend request. Delivery problems are reported in
/// `success` rather than as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResendOutcome {
    pub success: String,
}

/// What one sweep pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: Vec<JobId>,
    pub started: Vec<JobId>,
    pub alerted: Vec<JobId>,
    pub no_show_cancelled: Vec<JobId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty()
            && self.started.is_empty()
            && self.alerted.is_empty()
            && self.no_show_cancelled.is_empty()
    }
}

pub struct LifecycleEngine<N> {
    store: Arc<dyn Repository>,
    dispatcher: Arc<Dispatcher<N>>,
    policy: Arc<dyn EligibilityPolicy>,
    lifecycle: LifecycleConfig,
    admin_email: Option<String>,
    locks: JobLocks,
}

impl<N: Notifier> LifecycleEngine<N> {
    pub fn new(
        store: Arc<dyn Repository>,
        dispatcher: Arc<Dispatcher<N>>,
        lifecycle: LifecycleConfig,
        admin_email: Option<String>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            policy: Arc::new(DefaultEligibility),
            lifecycle,
            admin_email,
            locks: JobLocks::new(),
        }
    }

    #[cfg(test)]
    pub fn with_policy(mut self, policy: Arc<dyn EligibilityPolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[cfg(test)]
    pub fn dispatcher(&self) -> &Arc<Dispatcher<N>> {
        &self.dispatcher
    }

    // ----- queries -----

    /// Open jobs of `user_id`, or every job matching `filter` when an admin
    /// asks without one. `filter` is ignored for a single user's listing.
    pub fn list_jobs(
        &self,
        caller: &Caller,
        user_id: Option<UserId>,
        filter: ListFilter,
    ) -> Result<JobListing, BookingError> {
        match user_id {
            Some(id) => {
                self.ensure_self_or_admin(caller, id)?;
                let filter = JobFilter {
                    involving: Some(id),
                    ..JobFilter::with_statuses(&OPEN_STATUSES)
                };
                let (immediate, normal): (Vec<Job>, Vec<Job>) = self
                    .store
                    .query(&filter)?
                    .into_iter()
                    .partition(|j| j.immediate);
                Ok(JobListing::User(UserJobs {
                    user_id: id,
                    immediate,
                    normal,
                }))
            }
            None if caller.is_admin() => {
                Ok(JobListing::All(self.store.query(&JobFilter::from(filter))?))
            }
            None => Err(BookingError::validation(
                "Invalid request. Please provide a valid user id or user type.",
            )),
        }
    }

    /// Closed jobs of a user, newest first. `page` starts at 1.
    pub fn history(
        &self,
        caller: &Caller,
        user_id: Option<UserId>,
        page: Option<usize>,
    ) -> Result<HistoryPage, BookingError> {
        let user_id = user_id.ok_or_else(|| BookingError::validation("User ID is required."))?;
        self.ensure_self_or_admin(caller, user_id)?;

        let filter = JobFilter {
            involving: Some(user_id),
            ..JobFilter::with_statuses(&CLOSED_STATUSES)
        };
        let mut jobs = self.store.query(&filter)?;
        jobs.reverse();

        let page = page.unwrap_or(1).max(1);
        let total = jobs.len();
        let jobs = jobs
            .into_iter()
            .skip(page.saturating_sub(1).saturating_mul(HISTORY_PAGE_SIZE))
            .take(HISTORY_PAGE_SIZE)
            .collect();
        Ok(HistoryPage {
            user_id,
            page,
            per_page: HISTORY_PAGE_SIZE,
            total,
            jobs,
        })
    }

    pub fn job_details(&self, caller: &Caller, job_id: JobId) -> Result<JobDetails, BookingError> {
        let job = self.load(job_id)?;
        let visible = caller.is_admin()
            || job.involves(caller.user_id)
            || (job.status == JobStatus::Pending && caller.can(Capability::Translate));
        if !visible {
            return Err(BookingError::forbidden("You cannot view this job"));
        }
        let translator = match job.translator_id {
            Some(id) => self.store.user(id)?,
            None => None,
        };
        let distance = self.store.distance(job_id)?;
        Ok(JobDetails {
            job,
            translator,
            distance,
        })
    }

    /// Pending jobs the calling translator may accept, soonest first.
    pub fn potential_jobs(&self, caller: &Caller) -> Result<Vec<Job>, BookingError> {
        caller.require(Capability::Translate)?;
        let user = self.translator(caller.user_id)?;
        Ok(self
            .store
            .query(&JobFilter::with_statuses(&[JobStatus::Pending]))?
            .into_iter()
            .filter(|job| self.policy.is_eligible(&user, job))
            .collect())
    }

    // ----- booking -----

    pub async fn create_job(
        &self,
        caller: &Caller,
        booking: NewBooking,
    ) -> Result<Job, BookingError> {
        caller.require(Capability::Book)?;
        let NewBooking { spec, due_at } = booking;

        if spec.from_language.trim().is_empty() {
            return Err(BookingError::validation("from_language is required"));
        }
        if spec.duration_min == 0 {
            return Err(BookingError::validation("duration_min must be greater than zero"));
        }

        let now = Utc::now();
        let due_at = if spec.immediate {
            now + Duration::minutes(self.lifecycle.immediate_lead_minutes)
        } else {
            let due = due_at.ok_or_else(|| BookingError::validation("due_at is required"))?;
            if due <= now {
                return Err(BookingError::validation("due_at must be in the future"));
            }
            due
        };

        let job = self.store.insert(Job::new(caller.user_id, spec, due_at, now))?;
        let _guard = self.locks.acquire(job.id).await;
        let transition = StateMachine::apply(&job, Action::Publish, Some(caller.user_id), now)?;
        let job = self.commit(transition)?.job;

        tracing::info!(
            job_id = job.id,
            user_id = caller.user_id,
            immediate = job.immediate,
            due_at = %job.scheduled_due_at,
            "booking created"
        );
        self.notify_candidates(&job, NoticeKind::NewJob, ChannelSelector::All)?;
        Ok(job)
    }

    pub async fn update_job(
        &self,
        caller: &Caller,
        job_id: JobId,
        changes: BookingChanges,
    ) -> Result<Job, BookingError> {
        let _guard = self.locks.acquire(job_id).await;
        let job = self.load(job_id)?;
        if !caller.is_admin() && job.customer_id != caller.user_id {
            return Err(BookingError::forbidden("Only the customer or an admin can update this job"));
        }
        if job.status.is_terminal() {
            return Err(BookingError::InvalidState {
                job_id,
                status: job.status,
                action: "update",
            });
        }

        let now = Utc::now();
        let mut patch = JobPatch {
            instructions: changes.instructions,
            ..Default::default()
        };
        if let Some(due) = changes.due_at
            && due != job.scheduled_due_at
        {
            if due <= now {
                return Err(BookingError::validation("due_at must be in the future"));
            }
            patch.scheduled_due_at = Some(due);
            patch.will_expire_at = Some(will_expire_at(due, now));
        }
        if let Some(lang) = changes.from_language.map(|l| l.trim().to_string())
            && lang != job.from_language
        {
            if lang.is_empty() {
                return Err(BookingError::validation("from_language cannot be empty"));
            }
            patch.from_language = Some(lang);
        }
        if let Some(minutes) = changes.duration_min {
            if minutes == 0 {
                return Err(BookingError::validation("duration_min must be greater than zero"));
            }
            patch.duration_min = Some(minutes);
        }
        if patch.is_empty() {
            return Err(BookingError::validation("Nothing to update"));
        }
        if caller.is_admin() {
            patch.by_admin = Some(true);
        }

        let notify = patch.scheduled_due_at.is_some() || patch.from_language.is_some();
        let updated = self
            .store
            .patch(job_id, &patch)?
            .ok_or(BookingError::NotFound(job_id))?;
        tracing::info!(job_id, user_id = caller.user_id, "booking updated");

        if notify {
            let mut recipients = self.customer_recipient(&updated)?;
            if let Some(id) = updated.translator_id {
                recipients.extend(self.user_recipient(id, RecipientRole::Translator)?);
            }
            self.send(&recipients, &updated, NoticeKind::JobChanged, ChannelSelector::All);
        }
        Ok(updated)
    }

    /// Stores the confirmation contact on a booking and e-mails the
    /// customer, at `user_email` when one is set.
    pub async fn store_job_email(
        &self,
        caller: &Caller,
        request: JobEmail,
    ) -> Result<Job, BookingError> {
        let job_id = request
            .job_id
            .ok_or_else(|| BookingError::validation("jobid is required"))?;
        let _guard = self.locks.acquire(job_id).await;
        let job = self.load(job_id)?;
        if !caller.is_admin() && job.customer_id != caller.user_id {
            return Err(BookingError::forbidden("Only the customer or an admin can change this booking"));
        }

        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let user_email = clean(request.user_email);
        if let Some(email) = &user_email
            && !email.contains('@')
        {
            return Err(BookingError::validation(format!("Invalid email address: {email}")));
        }
        let patch = JobPatch {
            user_email,
            reference: clean(request.reference),
            address: clean(request.address),
            ..Default::default()
        };
        let job = if patch.is_empty() {
            job
        } else {
            self.store
                .patch(job_id, &patch)?
                .ok_or(BookingError::NotFound(job_id))?
        };
        tracing::info!(job_id, user_id = caller.user_id, "booking contact stored");

        let mut recipients = self.customer_recipient(&job)?;
        if let Some(email) = &job.user_email {
            match recipients.first_mut() {
                Some(customer) => customer.email = Some(email.clone()),
                None => recipients.push(Recipient {
                    user_id: Some(job.customer_id),
                    role: RecipientRole::Customer,
                    name: String::new(),
                    email: Some(email.clone()),
                    phone: None,
                    push_enabled: false,
                }),
            }
        }
        self.send(
            &recipients,
            &job,
            NoticeKind::BookingReceived,
            ChannelSelector::Only(Channel::Email),
        );
        Ok(job)
    }

    // ----- lifecycle -----

    pub async fn accept_job(&self, caller: &Caller, job_id: JobId) -> Result<Job, BookingError> {
        caller.require(Capability::Translate)?;
        let translator = self.translator(caller.user_id)?;

        let _guard = self.locks.acquire(job_id).await;
        let job = self.load(job_id)?;
        let now = Utc::now();
        let transition = StateMachine::apply(
            &job,
            Action::Accept {
                translator: caller.user_id,
            },
            Some(caller.user_id),
            now,
        )?;

        if !self.policy.is_eligible(&translator, &job) {
            return Err(BookingError::validation("You are not eligible for this job"));
        }
        self.ensure_no_clash(&job, caller.user_id)?;

        let committed = self.commit(transition)?;
        let job = committed.job;
        tracing::info!(job_id, translator_id = caller.user_id, "job accepted");

        let customer = self.customer_recipient(&job)?;
        self.send(&customer, &job, NoticeKind::JobAccepted, ChannelSelector::All);
        let me = [Recipient::from_user(&translator, RecipientRole::Translator)];
        self.send(&me, &job, NoticeKind::AcceptConfirmed, ChannelSelector::All);
        Ok(job)
    }

    /// Same as [`accept_job`](Self::accept_job), answering with a message for
    /// link-based acceptance.
    pub async fn accept_job_with_id(
        &self,
        caller: &Caller,
        job_id: JobId,
    ) -> Result<Acceptance, BookingError> {
        let job = self.accept_job(caller, job_id).await?;
        Ok(Acceptance {
            message: format!(
                "You have accepted booking #{} in {} on {}",
                job.id,
                job.from_language,
                job.scheduled_due_at.format("%Y-%m-%d %H:%M")
            ),
            job,
        })
    }

    /// Manual start by an admin or the assigned translator.
    pub async fn start_job(&self, caller: &Caller, job_id: JobId) -> Result<Job, BookingError> {
        let _guard = self.locks.acquire(job_id).await;
        let job = self.load(job_id)?;
        if !caller.is_admin() && job.translator_id != Some(caller.user_id) {
            return Err(BookingError::forbidden("Only the assigned translator or an admin can start this job"));
        }
        let transition = StateMachine::apply(&job, Action::Start, Some(caller.user_id), Utc::now())?;
        let job = self.commit(transition)?.job;
        tracing::info!(job_id, user_id = caller.user_id, "job started");
        Ok(job)
    }

    pub async fn cancel_job(&self, caller: &Caller, job_id: JobId) -> Result<Job, BookingError> {
        let _guard = self.locks.acquire(job_id).await;
        let job = self.load(job_id)?;
        if !caller.is_admin() && job.customer_id != caller.user_id {
            return Err(BookingError::forbidden("Only the customer or an admin can cancel this job"));
        }
        let now = Utc::now();
        let late = job.scheduled_due_at - now < Duration::hours(self.lifecycle.late_cancel_hours);
        self.cancel_locked(&job, late, Some(caller.user_id), now)
    }

    pub async fn end_job(&self, caller: &Caller, job_id: JobId) -> Result<Job, BookingError> {
        let _guard = self.locks.acquire(job_id).await;
        let job = self.load(job_id)?;
        if !caller.is_admin() && !job.involves(caller.user_id) {
            return Err(BookingError::forbidden("You cannot end this job"));
        }
        let transition = StateMachine::apply(&job, Action::End, Some(caller.user_id), Utc::now())?;
        let job = self.commit(transition)?.job;
        tracing::info!(
            job_id,
            user_id = caller.user_id,
            session_time = ?job.session_time.map(|t| t.to_string()),
            "job ended"
        );

        let mut recipients = self.customer_recipient(&job)?;
        if let Some(id) = job.translator_id {
            recipients.extend(self.user_recipient(id, RecipientRole::Translator)?);
        }
        self.send(&recipients, &job, NoticeKind::JobCompleted, ChannelSelector::All);
        Ok(job)
    }

    /// Records that the customer did not show up. The status is left alone;
    /// [`sweep`](Self::sweep) may cancel the job later when configured to.
    pub async fn customer_not_call(
        &self,
        caller: &Caller,
        job_id: JobId,
    ) -> Result<Job, BookingError> {
        let _guard = self.locks.acquire(job_id).await;
        let job = self.load(job_id)?;
        if !caller.is_admin() && job.translator_id != Some(caller.user_id) {
            return Err(BookingError::forbidden("Only the assigned translator or an admin can report a no-show"));
        }
        if !matches!(job.status, JobStatus::Assigned | JobStatus::InProgress) {
            return Err(BookingError::InvalidState {
                job_id,
                status: job.status,
                action: "mark customer not called",
            });
        }
        let patch = JobPatch {
            customer_not_call_at: Some(Utc::now()),
            ..Default::default()
        };
        let job = self
            .store
            .patch(job_id, &patch)?
            .ok_or(BookingError::NotFound(job_id))?;
        tracing::info!(job_id, user_id = caller.user_id, "customer did not call");
        Ok(job)
    }

    /// Puts a cancelled or expired job back into the pool.
    pub async fn reopen(&self, caller: &Caller, job_id: JobId) -> Result<Job, BookingError> {
        let _guard = self.locks.acquire(job_id).await;
        let job = self.load(job_id)?;
        if !caller.is_admin() && job.customer_id != caller.user_id {
            return Err(BookingError::forbidden("Only the customer or an admin can reopen this job"));
        }
        let now = Utc::now();
        let due_at = if job.scheduled_due_at <= now {
            now + Duration::hours(self.lifecycle.reopen_lead_hours)
        } else {
            job.scheduled_due_at
        };
        let transition = StateMachine::apply(&job, Action::Reopen { due_at }, Some(caller.user_id), now)?;
        let job = self.commit(transition)?.job;
        tracing::info!(job_id, user_id = caller.user_id, due_at = %job.scheduled_due_at, "job reopened");

        self.notify_candidates(&job, NoticeKind::NewJob, ChannelSelector::All)?;
        Ok(job)
    }

    /// Expires a job that is still pending at its due time.
    pub async fn expire_job(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, BookingError> {
        let _guard = self.locks.acquire(job_id).await;
        let job = self.load(job_id)?;
        let transition = StateMachine::apply(&job, Action::Expire, None, now)?;
        let job = self.commit(transition)?.job;
        tracing::info!(job_id, "job expired without a translator");
        Ok(job)
    }

    // ----- admin -----

    pub async fn distance_feed(
        &self,
        caller: &Caller,
        request: DistanceFeedRequest,
    ) -> Result<FeedOutcome, BookingError> {
        caller.require(Capability::Administer)?;
        let update = request.validate()?;
        let job_id = update.job_id;

        let _guard = self.locks.acquire(job_id).await;
        self.load(job_id)?;

        let distance = if update.distance.is_empty() {
            None
        } else {
            Some(self.store.upsert_distance(job_id, &update.distance)?)
        };
        let job = if update.job.is_empty() {
            None
        } else {
            self.store.patch(job_id, &update.job)?
        };
        tracing::info!(
            job_id,
            user_id = caller.user_id,
            distance = distance.is_some(),
            metadata = job.is_some(),
            "distance feed applied"
        );
        Ok(FeedOutcome {
            message: "Record updated!",
            distance,
            job,
        })
    }

    /// Re-sends the job notice to its translator, or to every eligible
    /// translator while it is unassigned.
    pub fn resend_notifications(
        &self,
        caller: &Caller,
        job_id: JobId,
        selector: ChannelSelector,
    ) -> Result<ResendOutcome, BookingError> {
        caller.require(Capability::Administer)?;
        let job = self.load(job_id)?;
        let (recipients, kind) = self.translator_audience(&job)?;
        self.send(&recipients, &job, kind, selector);
        Ok(ResendOutcome {
            success: "Push sent".to_string(),
        })
    }

    /// Sends the job notice by SMS and waits for the result. Delivery
    /// failures come back as the `success` text, not as an error.
    pub async fn resend_sms(
        &self,
        caller: &Caller,
        job_id: JobId,
    ) -> Result<ResendOutcome, BookingError> {
        caller.require(Capability::Administer)?;
        let job = self.load(job_id)?;
        let (recipients, kind) = self.translator_audience(&job)?;
        let events = fan_out(&recipients, &Notice::new(kind, &job), ChannelSelector::Only(Channel::Sms));
        if events.is_empty() {
            return Ok(ResendOutcome {
                success: "No translator with a phone number".to_string(),
            });
        }

        let report = self.dispatcher.deliver(events).await;
        let success = match report.first_error() {
            None => "SMS sent".to_string(),
            Some(error) => {
                tracing::warn!(job_id, %error, "SMS resend failed");
                error.to_string()
            }
        };
        Ok(ResendOutcome { success })
    }

    // ----- sweep -----

    /// One pass of time-driven transitions as of `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, BookingError> {
        let mut report = SweepReport::default();

        if let Some(grace) = self.lifecycle.no_show_grace_minutes {
            let filter = JobFilter::with_statuses(&[JobStatus::Assigned, JobStatus::InProgress]);
            for job in self.store.query(&filter)? {
                let Some(at) = job.customer_not_call_at else { continue };
                if at + Duration::minutes(grace) > now {
                    continue;
                }
                let _guard = self.locks.acquire(job.id).await;
                let current = self.load(job.id)?;
                if current.customer_not_call && !current.status.is_terminal() {
                    self.cancel_locked(&current, false, None, now)?;
                    report.no_show_cancelled.push(job.id);
                }
            }
        }

        let overdue = JobFilter {
            due_before: Some(now),
            ..JobFilter::with_statuses(&[JobStatus::Pending])
        };
        for job in self.store.query(&overdue)? {
            match self.expire_job(job.id, now).await {
                Ok(_) => report.expired.push(job.id),
                Err(e) if e.is_client_error() => {
                    tracing::debug!(job_id = job.id, error = %e, "skipped expiry")
                }
                Err(e) => return Err(e),
            }
        }

        let due = JobFilter {
            due_before: Some(now),
            ..JobFilter::with_statuses(&[JobStatus::Assigned])
        };
        for job in self.store.query(&due)? {
            let _guard = self.locks.acquire(job.id).await;
            let current = self.load(job.id)?;
            match StateMachine::apply(&current, Action::Start, None, now) {
                Ok(transition) => {
                    self.commit(transition)?;
                    report.started.push(job.id);
                }
                Err(e) => tracing::debug!(job_id = job.id, error = %e, "skipped start"),
            }
        }

        for job in self.store.query(&JobFilter::with_statuses(&[JobStatus::Pending]))? {
            if job.expiry_alert_sent || job.will_expire_at > now {
                continue;
            }
            let Some(email) = &self.admin_email else { break };
            if self.alert_unaccepted(job.id, email, now).await? {
                report.alerted.push(job.id);
            }
        }

        self.locks.prune();
        tracing::debug!(locks = self.locks.len(), "job locks pruned");
        if !report.is_empty() {
            tracing::info!(
                expired = report.expired.len(),
                started = report.started.len(),
                alerted = report.alerted.len(),
                no_show_cancelled = report.no_show_cancelled.len(),
                "sweep finished"
            );
        }
        Ok(report)
    }

    // ----- helpers -----

    /// Sends the one-time "not accepted" e-mail if the job is still pending
    /// past its deadline once the lock is held.
    async fn alert_unaccepted(
        &self,
        job_id: JobId,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, BookingError> {
        let _guard = self.locks.acquire(job_id).await;
        let current = self.load(job_id)?;
        if current.status != JobStatus::Pending
            || current.expiry_alert_sent
            || current.will_expire_at > now
        {
            return Ok(false);
        }
        let patch = JobPatch {
            expiry_alert_sent: Some(true),
            ..Default::default()
        };
        let Some(job) = self.store.patch(job_id, &patch)? else {
            return Ok(false);
        };
        self.send(
            &[Recipient::admin(email.to_string())],
            &job,
            NoticeKind::Unaccepted,
            ChannelSelector::Only(Channel::Email),
        );
        Ok(true)
    }

    fn load(&self, job_id: JobId) -> Result<Job, BookingError> {
        self.store.find(job_id)?.ok_or(BookingError::NotFound(job_id))
    }

    fn translator(&self, user_id: UserId) -> Result<User, BookingError> {
        match self.store.user(user_id)? {
            Some(user) if user.role == Role::Translator => Ok(user),
            _ => Err(BookingError::validation(format!("Unknown translator: {user_id}"))),
        }
    }

    fn ensure_self_or_admin(&self, caller: &Caller, user_id: UserId) -> Result<(), BookingError> {
        if caller.is_admin() || caller.user_id == user_id {
            Ok(())
        } else {
            Err(BookingError::forbidden("You can only view your own jobs"))
        }
    }

    fn ensure_no_clash(&self, job: &Job, translator: UserId) -> Result<(), BookingError> {
        let filter = JobFilter {
            translator_id: Some(translator),
            ..JobFilter::with_statuses(&[JobStatus::Assigned, JobStatus::InProgress])
        };
        if self.store.query(&filter)?.iter().any(|other| other.overlaps(job)) {
            return Err(BookingError::validation(
                "You already have a booking at that time",
            ));
        }
        Ok(())
    }

    /// Writes `transition.job` if the stored status is still `transition.from`.
    fn commit(&self, transition: Transition) -> Result<Transition, BookingError> {
        let id = transition.job.id;
        if self
            .store
            .compare_and_set_status(id, transition.from, &transition.job)?
        {
            tracing::debug!(job_id = id, from = %transition.from, to = %transition.to, "status committed");
            return Ok(transition);
        }

        let current = self.load(id)?;
        if matches!(transition.to, JobStatus::Assigned) {
            return Err(BookingError::Conflict(id));
        }
        Err(BookingError::InvalidState {
            job_id: id,
            status: current.status,
            action: "update",
        })
    }

    fn cancel_locked(
        &self,
        job: &Job,
        late: bool,
        by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Job, BookingError> {
        let transition = StateMachine::apply(job, Action::Cancel { late }, by, now)?;
        let released = transition.released;
        let job = self.commit(transition)?.job;
        tracing::info!(job_id = job.id, user_id = ?by, late, released = ?released, "job cancelled");

        if let Some(translator) = released {
            let recipients = self.user_recipient(translator, RecipientRole::Translator)?;
            self.send(&recipients, &job, NoticeKind::JobReleased, ChannelSelector::All);
        }
        if by != Some(job.customer_id) {
            let customer = self.customer_recipient(&job)?;
            self.send(&customer, &job, NoticeKind::JobCancelled, ChannelSelector::All);
        }
        Ok(job)
    }

    fn user_recipient(
        &self,
        user_id: UserId,
        role: RecipientRole,
    ) -> Result<Vec<Recipient>, BookingError> {
        Ok(self
            .store
            .user(user_id)?
            .map(|u| Recipient::from_user(&u, role))
            .into_iter()
            .collect())
    }

    fn customer_recipient(&self, job: &Job) -> Result<Vec<Recipient>, BookingError> {
        self.user_recipient(job.customer_id, RecipientRole::Customer)
    }

    fn candidates(&self, job: &Job) -> Result<Vec<Recipient>, BookingError> {
        Ok(self
            .store
            .users_with_role(Role::Translator)?
            .iter()
            .filter(|u| self.policy.is_eligible(u, job))
            .map(|u| Recipient::from_user(u, RecipientRole::Translator))
            .collect())
    }

    fn translator_audience(&self, job: &Job) -> Result<(Vec<Recipient>, NoticeKind), BookingError> {
        match job.translator_id {
            Some(id) => Ok((
                self.user_recipient(id, RecipientRole::Translator)?,
                NoticeKind::Reminder,
            )),
            None => Ok((self.candidates(job)?, NoticeKind::NewJob)),
        }
    }

    fn notify_candidates(
        &self,
        job: &Job,
        kind: NoticeKind,
        selector: ChannelSelector,
    ) -> Result<(), BookingError> {
        let recipients = self.candidates(job)?;
        tracing::debug!(job_id = job.id, candidates = recipients.len(), "notifying translators");
        self.send(&recipients, job, kind, selector);
        Ok(())
    }

    fn send(&self, recipients: &[Recipient], job: &Job, kind: NoticeKind, selector: ChannelSelector) {
        let events = fan_out(recipients, &Notice::new(kind, job), selector);
        self.dispatcher.spawn(events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::recording::RecordingNotifier;
    use crate::state_machine::{SessionTime, TranslatorLevel};
    use crate::store::{DistanceStore, InMemoryStore, JobStore};
    use std::time::Duration as StdDuration;

    fn user(id: UserId, role: Role, phone: Option<&str>) -> User {
        User {
            id,
            name: format!("user{id}"),
            role,
            email: Some(format!("user{id}@example.com")),
            phone: phone.map(String::from),
            push_enabled: true,
            languages: vec!["sv".into()],
            level: (role == Role::Translator).then_some(TranslatorLevel::Professional),
            gender: None,
        }
    }

    fn setup_with(
        notifier: RecordingNotifier,
        lifecycle: LifecycleConfig,
    ) -> (Arc<InMemoryStore>, LifecycleEngine<RecordingNotifier>) {
        let store = Arc::new(InMemoryStore::new());
        store.add_user(user(1, Role::Customer, Some("+4610"))).unwrap();
        store.add_user(user(20, Role::Translator, Some("+4620"))).unwrap();
        store.add_user(user(21, Role::Translator, Some("+4621"))).unwrap();
        store.add_user(user(90, Role::Admin, None)).unwrap();
        let dispatcher = Arc::new(Dispatcher::new(notifier, StdDuration::from_secs(1)));
        let engine = LifecycleEngine::new(
            store.clone(),
            dispatcher,
            lifecycle,
            Some("ops@example.com".into()),
        );
        (store, engine)
    }

    fn setup() -> (Arc<InMemoryStore>, LifecycleEngine<RecordingNotifier>) {
        setup_with(RecordingNotifier::default(), LifecycleConfig::default())
    }

    fn customer() -> Caller {
        Caller::new(1, Role::Customer)
    }

    fn translator(id: UserId) -> Caller {
        Caller::new(id, Role::Translator)
    }

    fn admin() -> Caller {
        Caller::new(90, Role::Admin)
    }

    fn booking(hours_ahead: i64) -> NewBooking {
        NewBooking {
            spec: JobSpec {
                from_language: "sv".into(),
                duration_min: 60,
                ..Default::default()
            },
            due_at: Some(Utc::now() + Duration::hours(hours_ahead)),
        }
    }

    /// Stores a job directly in `status`, bypassing the engine.
    fn seed(
        store: &InMemoryStore,
        id: JobId,
        status: JobStatus,
        translator: Option<UserId>,
        due_in: Duration,
    ) -> Job {
        let now = Utc::now();
        let mut job = Job::new(
            1,
            JobSpec {
                from_language: "sv".into(),
                duration_min: 60,
                ..Default::default()
            },
            now + due_in,
            now,
        );
        job.id = id;
        job.status = status;
        job.translator_id = translator;
        store.put_job(job.clone()).unwrap();
        job
    }

    #[tokio::test]
    async fn create_publishes_and_notifies_translators() {
        let (_, engine) = setup();
        let job = engine.create_job(&customer(), booking(48)).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.history.len(), 1);

        // Two translators, push + sms + email each.
        assert!(engine.dispatcher().notifier().wait_for(6).await);
        let events = engine.dispatcher().notifier().events();
        assert!(events.iter().all(|e| e.payload.kind == NoticeKind::NewJob));
    }

    #[tokio::test]
    async fn create_validates_input() {
        let (_, engine) = setup();
        let mut b = booking(2);
        b.due_at = None;
        assert!(matches!(
            engine.create_job(&customer(), b).await,
            Err(BookingError::Validation(_))
        ));
        assert!(matches!(
            engine.create_job(&customer(), booking(-1)).await,
            Err(BookingError::Validation(_))
        ));
        assert!(matches!(
            engine.create_job(&translator(20), booking(2)).await,
            Err(BookingError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn immediate_booking_is_due_shortly() {
        let (_, engine) = setup();
        let mut b = booking(0);
        b.due_at = None;
        b.spec.immediate = true;
        let job = engine.create_job(&customer(), b).await.unwrap();
        let lead = job.scheduled_due_at - job.created_at;
        assert_eq!(lead.num_minutes(), 5);

        match engine.list_jobs(&customer(), Some(1), ListFilter::default()).unwrap() {
            JobListing::User(jobs) => {
                assert_eq!(jobs.immediate.len(), 1);
                assert!(jobs.normal.is_empty());
            }
            JobListing::All(_) => panic!("expected user listing"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_accept_has_one_winner() {
        let (store, engine) = setup();
        seed(&store, 42, JobStatus::Pending, None, Duration::hours(4));
        let engine = Arc::new(engine);

        let a = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.accept_job(&translator(20), 42).await })
        };
        let b = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.accept_job(&translator(21), 42).await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let conflict = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(matches!(conflict, BookingError::Conflict(42)));
        assert!(conflict.to_string().contains("already accepted"));

        let stored = store.find(42).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Assigned);
        assert!(matches!(stored.translator_id, Some(20) | Some(21)));
    }

    #[tokio::test]
    async fn accept_notifies_customer_and_translator() {
        let (store, engine) = setup();
        seed(&store, 5, JobStatus::Pending, None, Duration::hours(4));
        let accepted = engine.accept_job_with_id(&translator(20), 5).await.unwrap();
        assert_eq!(accepted.job.translator_id, Some(20));
        assert!(accepted.message.contains("#5"));

        assert!(engine.dispatcher().notifier().wait_for(6).await);
        let events = engine.dispatcher().notifier().events();
        assert!(events.iter().any(|e| e.payload.kind == NoticeKind::JobAccepted
            && e.recipient.user_id == Some(1)));
        assert!(events.iter().any(|e| e.payload.kind == NoticeKind::AcceptConfirmed
            && e.recipient.user_id == Some(20)));
    }

    #[tokio::test]
    async fn accept_rejects_schedule_clash() {
        let (store, engine) = setup();
        seed(&store, 1, JobStatus::Assigned, Some(20), Duration::hours(4));
        seed(&store, 2, JobStatus::Pending, None, Duration::hours(4) + Duration::minutes(30));
        let err = engine.accept_job(&translator(20), 2).await.unwrap_err();
        assert_eq!(err.to_string(), "You already have a booking at that time");
        assert_eq!(store.find(2).unwrap().unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn customer_cannot_accept() {
        let (store, engine) = setup();
        seed(&store, 3, JobStatus::Pending, None, Duration::hours(4));
        assert!(matches!(
            engine.accept_job(&customer(), 3).await,
            Err(BookingError::Forbidden(_))
        ));
        assert!(matches!(
            engine.accept_job(&translator(20), 99).await,
            Err(BookingError::NotFound(99))
        ));
    }

    #[tokio::test]
    async fn end_on_completed_job_keeps_session_time() {
        let (store, engine) = setup();
        let mut job = seed(&store, 8, JobStatus::Completed, Some(20), Duration::hours(-2));
        job.session_time = Some(SessionTime::from_secs(1800));
        store.put_job(job).unwrap();

        let err = engine.end_job(&translator(20), 8).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidState { .. }));
        assert_eq!(
            store.find(8).unwrap().unwrap().session_time,
            Some(SessionTime::from_secs(1800))
        );
    }

    #[tokio::test]
    async fn end_records_session_time() {
        let (store, engine) = setup();
        seed(&store, 9, JobStatus::InProgress, Some(20), Duration::minutes(-30));
        let job = engine.end_job(&translator(20), 9).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let secs = job.session_time.unwrap().as_secs();
        assert!((1790..=1810).contains(&secs), "{secs}");
    }

    #[tokio::test]
    async fn cancel_assigned_job_releases_translator() {
        let (store, engine) = setup();
        seed(&store, 7, JobStatus::Assigned, Some(20), Duration::hours(72));
        let job = engine.cancel_job(&customer(), 7).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.translator_id, None);
        assert!(!job.cancelled_late);

        assert!(engine.dispatcher().notifier().wait_for(3).await);
        let events = engine.dispatcher().notifier().events();
        assert!(events.iter().all(|e| e.payload.kind == NoticeKind::JobReleased));
        assert!(events.iter().all(|e| e.recipient.user_id == Some(20)));
    }

    #[tokio::test]
    async fn cancel_close_to_due_is_late() {
        let (store, engine) = setup();
        seed(&store, 4, JobStatus::Pending, None, Duration::hours(2));
        let job = engine.cancel_job(&admin(), 4).await.unwrap();
        assert!(job.cancelled_late);
        assert!(matches!(
            engine.cancel_job(&admin(), 4).await,
            Err(BookingError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn reopen_cancelled_job() {
        let (store, engine) = setup();
        let mut job = seed(&store, 11, JobStatus::Cancelled, None, Duration::hours(-3));
        job.released_translator = Some(20);
        job.translator_id = Some(20);
        store.put_job(job).unwrap();

        let job = engine.reopen(&admin(), 11).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.translator_id, None);
        assert!(job.scheduled_due_at > Utc::now() + Duration::hours(23));

        let err = engine.reopen(&admin(), 11).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn job_email_is_stored_and_confirmed_to_contact() {
        let (store, engine) = setup();
        seed(&store, 18, JobStatus::Pending, None, Duration::hours(30));

        let request = JobEmail {
            job_id: Some(18),
            user_email: Some(" desk@example.com ".into()),
            reference: Some("PO-7".into()),
            address: Some("Storgatan 1".into()),
        };
        let job = engine.store_job_email(&customer(), request).await.unwrap();
        assert_eq!(job.user_email.as_deref(), Some("desk@example.com"));
        assert_eq!(job.reference.as_deref(), Some("PO-7"));
        assert_eq!(store.find(18).unwrap().unwrap().address.as_deref(), Some("Storgatan 1"));

        assert!(engine.dispatcher().notifier().wait_for(1).await);
        let events = engine.dispatcher().notifier().events();
        let confirmation = events
            .iter()
            .find(|e| e.payload.kind == NoticeKind::BookingReceived)
            .unwrap();
        assert_eq!(confirmation.channel, Channel::Email);
        assert_eq!(confirmation.address().as_deref(), Some("desk@example.com"));
        assert!(confirmation.payload.message.contains("PO-7"));
    }

    #[tokio::test]
    async fn job_email_checks_input_and_owner() {
        let (store, engine) = setup();
        seed(&store, 19, JobStatus::Pending, None, Duration::hours(30));

        let err = engine
            .store_job_email(&customer(), JobEmail::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "jobid is required");

        let bad = JobEmail {
            job_id: Some(19),
            user_email: Some("not-an-address".into()),
            ..Default::default()
        };
        let err = engine.store_job_email(&customer(), bad).await.unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
        assert!(store.find(19).unwrap().unwrap().user_email.is_none());

        let other = JobEmail {
            job_id: Some(19),
            reference: Some("X".into()),
            ..Default::default()
        };
        let err = engine.store_job_email(&translator(20), other).await.unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));
    }

    #[tokio::test]
    async fn expiry_alert_skips_job_accepted_since_the_query() {
        let (store, engine) = setup();
        let mut job = seed(&store, 22, JobStatus::Assigned, Some(20), Duration::hours(2));
        job.will_expire_at = Utc::now() - Duration::hours(1);
        store.put_job(job).unwrap();

        let sent = engine
            .alert_unaccepted(22, "ops@example.com", Utc::now())
            .await
            .unwrap();
        assert!(!sent);
        assert!(!store.find(22).unwrap().unwrap().expiry_alert_sent);

        let mut pending = seed(&store, 23, JobStatus::Pending, None, Duration::hours(2));
        pending.will_expire_at = Utc::now() - Duration::hours(1);
        store.put_job(pending).unwrap();
        assert!(engine.alert_unaccepted(23, "ops@example.com", Utc::now()).await.unwrap());
        assert!(!engine.alert_unaccepted(23, "ops@example.com", Utc::now()).await.unwrap());

        assert!(engine.dispatcher().notifier().wait_for(1).await);
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        let alerts: Vec<_> = engine
            .dispatcher()
            .notifier()
            .events()
            .into_iter()
            .filter(|e| e.payload.kind == NoticeKind::Unaccepted)
            .map(|e| e.job_id)
            .collect();
        assert_eq!(alerts, vec![23]);
    }

    #[tokio::test]
    async fn start_by_assigned_translator_only() {
        let (store, engine) = setup();
        seed(&store, 14, JobStatus::Assigned, Some(20), Duration::minutes(5));

        let err = engine.start_job(&translator(21), 14).await.unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));

        let job = engine.start_job(&translator(20), 14).await.unwrap();
        assert_eq!(job.status, JobStatus::InProgress);
        assert!(matches!(
            engine.start_job(&admin(), 14).await,
            Err(BookingError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn customer_not_call_is_annotation_only() {
        let (store, engine) = setup();
        seed(&store, 12, JobStatus::Assigned, Some(20), Duration::minutes(-10));
        let job = engine.customer_not_call(&translator(20), 12).await.unwrap();
        assert!(job.customer_not_call);
        assert_eq!(job.status, JobStatus::Assigned);

        seed(&store, 13, JobStatus::Pending, None, Duration::hours(1));
        assert!(matches!(
            engine.customer_not_call(&admin(), 13).await,
            Err(BookingError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn potential_jobs_respect_eligibility() {
        let (store, engine) = setup();
        seed(&store, 1, JobStatus::Pending, None, Duration::hours(5));
        seed(&store, 2, JobStatus::Pending, None, Duration::hours(3));
        let mut german = seed(&store, 3, JobStatus::Pending, None, Duration::hours(4));
        german.from_language = "de".into();
        store.put_job(german).unwrap();
        seed(&store, 4, JobStatus::Assigned, Some(21), Duration::hours(4));

        let ids: Vec<_> = engine
            .potential_jobs(&translator(20))
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(engine.potential_jobs(&customer()).is_err());
    }

    #[tokio::test]
    async fn flag_without_comment_writes_nothing() {
        let (store, engine) = setup();
        seed(&store, 14, JobStatus::Completed, Some(20), Duration::hours(-5));
        let request: DistanceFeedRequest = serde_json::from_value(serde_json::json!({
            "jobid": "14", "flagged": "true", "admincomment": "", "distance": "9"
        }))
        .unwrap();
        let err = engine.distance_feed(&admin(), request).await.unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
        assert!(store.distance(14).unwrap().is_none());
        assert!(!store.find(14).unwrap().unwrap().flagged);
    }

    #[tokio::test]
    async fn distance_only_feed_touches_distance_record() {
        let (store, engine) = setup();
        let before = seed(&store, 15, JobStatus::Completed, Some(20), Duration::hours(-5));
        let request: DistanceFeedRequest = serde_json::from_value(serde_json::json!({
            "jobid": 15, "distance": "12", "time": "5"
        }))
        .unwrap();
        let outcome = engine.distance_feed(&admin(), request).await.unwrap();
        assert!(outcome.job.is_none());
        let record = outcome.distance.unwrap();
        assert_eq!(record.distance.as_deref(), Some("12"));
        assert_eq!(record.time.as_deref(), Some("5"));
        assert_eq!(store.find(15).unwrap().unwrap().updated_at, before.updated_at);

        let request = DistanceFeedRequest::default();
        assert!(engine.distance_feed(&translator(20), request).await.is_err());
    }

    #[tokio::test]
    async fn session_time_feed_updates_both_records() {
        let (store, engine) = setup();
        seed(&store, 17, JobStatus::Completed, Some(20), Duration::hours(-5));
        let request: DistanceFeedRequest = serde_json::from_value(serde_json::json!({
            "jobid": 17, "session_time": "00:50"
        }))
        .unwrap();
        let outcome = engine.distance_feed(&admin(), request).await.unwrap();
        let record = outcome.distance.unwrap();
        assert_eq!(record.session_time.map(|t| t.as_secs()), Some(3000));
        assert_eq!(
            store.find(17).unwrap().unwrap().session_time.map(|t| t.as_secs()),
            Some(3000)
        );
        assert!(store.distance(17).unwrap().is_some());
    }

    #[tokio::test]
    async fn sms_failure_is_a_soft_result() {
        let (store, engine) = setup_with(
            RecordingNotifier::failing(&[Channel::Sms]),
            LifecycleConfig::default(),
        );
        seed(&store, 16, JobStatus::Assigned, Some(20), Duration::hours(5));
        let outcome = engine.resend_sms(&admin(), 16).await.unwrap();
        assert!(outcome.success.contains("rejected"), "{}", outcome.success);

        let (store, engine) = setup();
        seed(&store, 16, JobStatus::Assigned, Some(20), Duration::hours(5));
        let outcome = engine.resend_sms(&admin(), 16).await.unwrap();
        assert_eq!(outcome.success, "SMS sent");
    }

    #[tokio::test]
    async fn resend_push_targets_candidates() {
        let (store, engine) = setup();
        seed(&store, 17, JobStatus::Pending, None, Duration::hours(5));
        let outcome = engine
            .resend_notifications(&admin(), 17, ChannelSelector::All)
            .unwrap();
        assert_eq!(outcome.success, "Push sent");
        assert!(engine.dispatcher().notifier().wait_for(6).await);
    }

    #[tokio::test]
    async fn sweep_expires_starts_and_alerts() {
        let (store, engine) = setup();
        let now = Utc::now();
        seed(&store, 1, JobStatus::Pending, None, Duration::minutes(-1));
        seed(&store, 2, JobStatus::Assigned, Some(20), Duration::minutes(-1));
        let mut near = seed(&store, 3, JobStatus::Pending, None, Duration::hours(1));
        near.will_expire_at = now - Duration::minutes(5);
        store.put_job(near).unwrap();
        seed(&store, 4, JobStatus::Pending, None, Duration::hours(100));

        let report = engine.sweep(now).await.unwrap();
        assert_eq!(report.expired, vec![1]);
        assert_eq!(report.started, vec![2]);
        assert_eq!(report.alerted, vec![3]);
        assert_eq!(store.find(2).unwrap().unwrap().status, JobStatus::InProgress);

        assert!(engine.dispatcher().notifier().wait_for(1).await);
        let alerts = engine.dispatcher().notifier().events();
        assert_eq!(alerts[0].payload.kind, NoticeKind::Unaccepted);
        assert_eq!(alerts[0].channel, Channel::Email);

        let again = engine.sweep(now).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn sweep_cancels_no_show_after_grace() {
        let lifecycle = LifecycleConfig {
            no_show_grace_minutes: Some(15),
            ..Default::default()
        };
        let (store, engine) = setup_with(RecordingNotifier::default(), lifecycle);
        let mut job = seed(&store, 5, JobStatus::InProgress, Some(20), Duration::minutes(-40));
        job.customer_not_call = true;
        job.customer_not_call_at = Some(Utc::now() - Duration::minutes(20));
        store.put_job(job).unwrap();

        let report = engine.sweep(Utc::now()).await.unwrap();
        assert_eq!(report.no_show_cancelled, vec![5]);
        let job = store.find(5).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.released_translator, Some(20));
    }

    #[tokio::test]
    async fn update_job_changes_and_notifies() {
        let (store, engine) = setup();
        seed(&store, 18, JobStatus::Assigned, Some(20), Duration::hours(10));
        let changes = BookingChanges {
            from_language: Some("fi".into()),
            ..Default::default()
        };
        let job = engine.update_job(&customer(), 18, changes).await.unwrap();
        assert_eq!(job.from_language, "fi");
        assert!(engine.dispatcher().notifier().wait_for(6).await);

        assert!(matches!(
            engine.update_job(&translator(20), 18, BookingChanges::default()).await,
            Err(BookingError::Forbidden(_))
        ));
        assert!(matches!(
            engine.update_job(&customer(), 18, BookingChanges::default()).await,
            Err(BookingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn history_lists_closed_jobs_newest_first() {
        let (store, engine) = setup();
        seed(&store, 1, JobStatus::Completed, Some(20), Duration::hours(-10));
        seed(&store, 2, JobStatus::Cancelled, None, Duration::hours(-5));
        seed(&store, 3, JobStatus::Pending, None, Duration::hours(5));

        let page = engine.history(&customer(), Some(1), None).unwrap();
        let ids: Vec<_> = page.jobs.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(page.total, 2);

        let err = engine.history(&customer(), None, None).unwrap_err();
        assert_eq!(err.to_string(), "User ID is required.");
        assert!(engine.history(&translator(21), Some(1), None).is_err());
    }

    #[tokio::test]
    async fn history_page_far_past_the_end_is_empty() {
        let (store, engine) = setup();
        seed(&store, 1, JobStatus::Completed, Some(20), Duration::hours(-10));

        let page = engine.history(&customer(), Some(1), Some(usize::MAX)).unwrap();
        assert!(page.jobs.is_empty());
        assert_eq!(page.total, 1);
        assert_eq!(page.page, usize::MAX);

        let page = engine.history(&customer(), Some(1), Some(0)).unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.jobs.len(), 1);
    }

    #[tokio::test]
    async fn list_requires_user_or_admin() {
        let (store, engine) = setup();
        seed(&store, 1, JobStatus::Pending, None, Duration::hours(5));
        assert!(matches!(
            engine.list_jobs(&admin(), None, ListFilter::default()).unwrap(),
            JobListing::All(jobs) if jobs.len() == 1
        ));
        assert!(matches!(
            engine.list_jobs(&customer(), None, ListFilter::default()),
            Err(BookingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn admin_listing_applies_filters() {
        let (store, engine) = setup();
        seed(&store, 1, JobStatus::Pending, None, Duration::hours(5));
        seed(&store, 2, JobStatus::Assigned, Some(20), Duration::hours(6));
        let mut flagged = seed(&store, 3, JobStatus::Completed, Some(21), Duration::hours(-2));
        flagged.flagged = true;
        store.put_job(flagged).unwrap();
        let mut german = seed(&store, 4, JobStatus::Pending, None, Duration::hours(7));
        german.from_language = "de".into();
        german.customer_id = 2;
        store.put_job(german).unwrap();

        let ids = |filter: ListFilter| match engine.list_jobs(&admin(), None, filter).unwrap() {
            JobListing::All(jobs) => jobs.into_iter().map(|j| j.id).collect::<Vec<_>>(),
            JobListing::User(_) => panic!("expected the full listing"),
        };
        assert_eq!(ids(ListFilter::default()), vec![3, 1, 2, 4]);
        assert_eq!(
            ids(ListFilter {
                status: Some(JobStatus::Pending),
                ..Default::default()
            }),
            vec![1, 4]
        );
        assert_eq!(
            ids(ListFilter {
                language: Some("DE".into()),
                ..Default::default()
            }),
            vec![4]
        );
        assert_eq!(
            ids(ListFilter {
                flagged: Some(true),
                ..Default::default()
            }),
            vec![3]
        );
        assert_eq!(
            ids(ListFilter {
                customer_id: Some(1),
                translator_id: Some(20),
                ..Default::default()
            }),
            vec![2]
        );
    }

    struct NoOne;

    impl EligibilityPolicy for NoOne {
        fn is_eligible(&self, _: &User, _: &Job) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn custom_policy_hides_jobs() {
        let (store, engine) = setup();
        let engine = engine.with_policy(Arc::new(NoOne));
        seed(&store, 1, JobStatus::Pending, None, Duration::hours(5));
        assert!(engine.potential_jobs(&translator(20)).unwrap().is_empty());
        let err = engine.accept_job(&translator(20), 1).await.unwrap_err();
        assert_eq!(err.to_string(), "You are not eligible for this job");
    }

    #[tokio::test]
    async fn job_details_include_translator() {
        let (store, engine) = setup();
        seed(&store, 6, JobStatus::Assigned, Some(20), Duration::hours(5));
        let details = engine.job_details(&customer(), 6).unwrap();
        assert_eq!(details.translator.unwrap().id, 20);
        assert!(details.distance.is_none());
        assert!(matches!(
            engine.job_details(&translator(21), 6),
            Err(BookingError::Forbidden(_))
        ));
    }
}
