use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub type JobId = u64;
pub type UserId = u64;

/// Lifecycle status of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Pending,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
    Expired,
}

impl JobStatus {
    /// Completed, Cancelled and Expired accept no further work.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Expired
        )
    }

    /// Statuses in which `translator_id` must be set.
    pub fn holds_translator(self) -> bool {
        matches!(
            self,
            JobStatus::Assigned | JobStatus::InProgress | JobStatus::Completed
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Created => "created",
            JobStatus::Pending => "pending",
            JobStatus::Assigned => "assigned",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(JobStatus::Created),
            "pending" => Ok(JobStatus::Pending),
            "assigned" => Ok(JobStatus::Assigned),
            "in_progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "cancelled" => Ok(JobStatus::Cancelled),
            "expired" => Ok(JobStatus::Expired),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Who pays for the job, which decides the translator levels allowed to take it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    #[default]
    Paid,
    Rws,
    Unpaid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

/// Length of an interpreting session, stored in whole seconds.
///
/// Accepts `HH:MM:SS`, `HH:MM` or a plain number of minutes and always
/// renders as `HH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionTime(u64);

impl SessionTime {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(self) -> u64 {
        self.0
    }

    /// Time between `start` and `end`; zero when `end` precedes `start`.
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self((end - start).num_seconds().max(0) as u64)
    }
}

impl fmt::Display for SessionTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.0 / 3600;
        let m = (self.0 % 3600) / 60;
        let s = self.0 % 60;
        write!(f, "{h:02}:{m:02}:{s:02}")
    }
}

impl FromStr for SessionTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || format!("invalid session time: {s:?}");
        let parts: Vec<&str> = s.split(':').collect();
        let nums = parts
            .iter()
            .map(|p| p.parse::<u64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        let (h, m, sec) = match nums.as_slice() {
            [minutes] => (0, *minutes, 0),
            [h, m] if *m < 60 => (*h, *m, 0),
            [h, m, sec] if *m < 60 && *sec < 60 => (*h, *m, *sec),
            _ => return Err(invalid()),
        };
        h.checked_mul(3600)
            .and_then(|hs| m.checked_mul(60).and_then(|ms| hs.checked_add(ms)))
            .and_then(|total| total.checked_add(sec))
            .map(Self)
            .ok_or_else(invalid)
    }
}

impl TryFrom<String> for SessionTime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SessionTime> for String {
    fn from(value: SessionTime) -> Self {
        value.to_string()
    }
}

/// One entry of a job's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: JobStatus,
    pub to: JobStatus,
    pub at: DateTime<Utc>,
    pub by: Option<UserId>,
}

/// Booking details supplied by the customer when a job is created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSpec {
    pub from_language: String,
    pub duration_min: u32,
    #[serde(default)]
    pub job_type: JobType,
    #[serde(default)]
    pub certified: bool,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub immediate: bool,
    #[serde(default)]
    pub instructions: String,
}

/// A single translation assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub customer_id: UserId,
    pub translator_id: Option<UserId>,
    pub from_language: String,
    pub duration_min: u32,
    pub job_type: JobType,
    pub certified: bool,
    pub gender: Option<Gender>,
    pub immediate: bool,
    #[serde(default)]
    pub instructions: String,
    /// Contact address for booking confirmations; falls back to the customer's own.
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub scheduled_due_at: DateTime<Utc>,
    pub will_expire_at: DateTime<Utc>,
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub admin_comments: String,
    #[serde(default)]
    pub manually_handled: bool,
    #[serde(default)]
    pub by_admin: bool,
    #[serde(default)]
    pub session_time: Option<SessionTime>,
    #[serde(default)]
    pub customer_not_call: bool,
    #[serde(default)]
    pub customer_not_call_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_late: bool,
    #[serde(default)]
    pub released_translator: Option<UserId>,
    #[serde(default)]
    pub expiry_alert_sent: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<StatusChange>,
}

impl Job {
    /// Builds an unsaved job in `Created`; the store assigns the id.
    pub fn new(
        customer_id: UserId,
        spec: JobSpec,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            status: JobStatus::Created,
            customer_id,
            translator_id: None,
            from_language: spec.from_language,
            duration_min: spec.duration_min,
            job_type: spec.job_type,
            certified: spec.certified,
            gender: spec.gender,
            immediate: spec.immediate,
            instructions: spec.instructions,
            user_email: None,
            reference: None,
            address: None,
            scheduled_due_at: due_at,
            will_expire_at: will_expire_at(due_at, now),
            flagged: false,
            admin_comments: String::new(),
            manually_handled: false,
            by_admin: false,
            session_time: None,
            customer_not_call: false,
            customer_not_call_at: None,
            cancelled_late: false,
            released_translator: None,
            expiry_alert_sent: false,
            completed_at: None,
            created_at: now,
            updated_at: now,
            history: Vec::new(),
        }
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_due_at + Duration::minutes(i64::from(self.duration_min))
    }

    /// True when the two bookings share any part of their time window.
    pub fn overlaps(&self, other: &Job) -> bool {
        self.scheduled_due_at < other.ends_at() && other.scheduled_due_at < self.ends_at()
    }

    pub fn involves(&self, user_id: UserId) -> bool {
        self.customer_id == user_id || self.translator_id == Some(user_id)
    }
}

/// Deadline after which an unaccepted booking is escalated to admins.
///
/// Short-notice bookings (due within 90 hours of being placed) keep their
/// due time as the deadline; anything booked further ahead must be picked
/// up 48 hours before it is due.
pub fn will_expire_at(due: DateTime<Utc>, created: DateTime<Utc>) -> DateTime<Utc> {
    let lead = due - created;
    if lead <= Duration::hours(90) {
        due
    } else {
        due - Duration::hours(48)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn short_notice_booking_expires_at_due_time() {
        let due = at(2023, 5, 10, 15);
        let created = at(2023, 5, 9, 8);
        assert_eq!(will_expire_at(due, created), due);
    }

    #[test]
    fn long_lead_booking_expires_two_days_early() {
        let due = at(2023, 5, 20, 15);
        let created = at(2023, 5, 9, 8);
        assert_eq!(will_expire_at(due, created), at(2023, 5, 18, 15));
    }

    #[test]
    fn session_time_parsing() {
        assert_eq!("01:30:15".parse::<SessionTime>().unwrap().as_secs(), 5415);
        assert_eq!("02:05".parse::<SessionTime>().unwrap().as_secs(), 7500);
        assert_eq!("45".parse::<SessionTime>().unwrap().as_secs(), 2700);
        assert!("1:75".parse::<SessionTime>().is_err());
        assert!("abc".parse::<SessionTime>().is_err());
        assert!("".parse::<SessionTime>().is_err());
        assert!("18446744073709551615".parse::<SessionTime>().is_err());
        assert!("18446744073709551615:00".parse::<SessionTime>().is_err());
        assert!("5124095576030431:00:00".parse::<SessionTime>().is_err());
    }

    #[test]
    fn session_time_display() {
        assert_eq!(SessionTime::from_secs(3725).to_string(), "01:02:05");
        assert_eq!(
            SessionTime::between(at(2023, 5, 10, 15), at(2023, 5, 10, 14)).as_secs(),
            0
        );
    }

    #[test]
    fn status_terminal_and_translator_sets() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Expired.is_terminal());
        assert!(!JobStatus::Assigned.is_terminal());
        assert!(JobStatus::InProgress.holds_translator());
        assert!(!JobStatus::Cancelled.holds_translator());
        assert_eq!("in_progress".parse::<JobStatus>().unwrap(), JobStatus::InProgress);
        assert_eq!(JobStatus::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn overlap_detection() {
        let spec = JobSpec {
            from_language: "sv".into(),
            duration_min: 60,
            ..Default::default()
        };
        let now = at(2023, 5, 1, 0);
        let a = Job::new(1, spec.clone(), at(2023, 5, 10, 10), now);
        let b = Job::new(1, spec.clone(), at(2023, 5, 10, 10) + Duration::minutes(30), now);
        let c = Job::new(1, spec, at(2023, 5, 10, 11), now);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn job_serialization_keeps_session_time_as_string() {
        let spec = JobSpec {
            from_language: "fi".into(),
            duration_min: 30,
            ..Default::default()
        };
        let mut job = Job::new(3, spec, at(2023, 5, 10, 15), at(2023, 5, 9, 8));
        job.session_time = Some(SessionTime::from_secs(90));
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["session_time"], "00:01:30");
        assert_eq!(json["status"], "created");
        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back.session_time, job.session_time);
    }
}
