use chrono::{DateTime, Utc};

use super::job::{Job, JobStatus, SessionTime, StatusChange, UserId, will_expire_at};
use crate::error::BookingError;

/// A requested lifecycle step for one job.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Created → Pending once the booking is stored.
    Publish,
    /// Pending → Assigned.
    Accept { translator: UserId },
    /// Assigned → InProgress.
    Start,
    /// Assigned/InProgress → Completed.
    End,
    /// Any non-terminal status → Cancelled.
    Cancel { late: bool },
    /// Cancelled/Expired → Pending, with a fresh due time.
    Reopen { due_at: DateTime<Utc> },
    /// Pending → Expired.
    Expire,
}

impl Action {
    fn verb(&self) -> &'static str {
        match self {
            Action::Publish => "publish",
            Action::Accept { .. } => "accept",
            Action::Start => "start",
            Action::End => "end",
            Action::Cancel { .. } => "cancel",
            Action::Reopen { .. } => "reopen",
            Action::Expire => "expire",
        }
    }
}

/// The outcome of a validated action: the job as it must be committed.
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: JobStatus,
    pub to: JobStatus,
    pub job: Job,
    /// Translator who lost the assignment through this transition.
    pub released: Option<UserId>,
}

/// Validates lifecycle actions and computes the next job record.
///
/// Pure: the caller commits `Transition::job` with a compare-and-set on
/// `Transition::from`.
pub struct StateMachine;

impl StateMachine {
    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (from, to),
            (Created, Pending)
                | (Pending, Assigned)
                | (Pending, Expired)
                | (Assigned, InProgress)
                | (Assigned, Completed)
                | (InProgress, Completed)
                | (Cancelled, Pending)
                | (Expired, Pending)
        ) || (to == Cancelled && !from.is_terminal())
    }

    pub fn apply(
        job: &Job,
        action: Action,
        by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Transition, BookingError> {
        let from = job.status;

        // Someone else got there first; report the race, not a bad state.
        if matches!(action, Action::Accept { .. }) && job.translator_id.is_some() {
            return Err(BookingError::Conflict(job.id));
        }

        let to = match &action {
            Action::Publish => JobStatus::Pending,
            Action::Accept { .. } => JobStatus::Assigned,
            Action::Start => JobStatus::InProgress,
            Action::End => JobStatus::Completed,
            Action::Cancel { .. } => JobStatus::Cancelled,
            Action::Reopen { .. } => JobStatus::Pending,
            Action::Expire => JobStatus::Expired,
        };

        if !Self::can_transition(from, to) {
            return Err(BookingError::InvalidState {
                job_id: job.id,
                status: from,
                action: action.verb(),
            });
        }

        let mut next = job.clone();
        let mut released = None;
        match action {
            Action::Publish | Action::Start | Action::Expire => {}
            Action::Accept { translator } => {
                next.translator_id = Some(translator);
            }
            Action::End => {
                next.session_time = Some(SessionTime::between(job.scheduled_due_at, now));
                next.completed_at = Some(now);
            }
            Action::Cancel { late } => {
                released = next.translator_id.take();
                next.released_translator = released;
                next.cancelled_late = late;
            }
            Action::Reopen { due_at } => {
                next.translator_id = None;
                next.customer_not_call = false;
                next.customer_not_call_at = None;
                next.cancelled_late = false;
                next.expiry_alert_sent = false;
                next.completed_at = None;
                next.scheduled_due_at = due_at;
                next.will_expire_at = will_expire_at(due_at, now);
            }
        }

        next.status = to;
        next.updated_at = now;
        next.history.push(StatusChange {
            from,
            to,
            at: now,
            by,
        });

        debug_assert_eq!(next.translator_id.is_some(), to.holds_translator());

        Ok(Transition {
            from,
            to,
            job: next,
            released,
        })
    }
}
