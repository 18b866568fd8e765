//! Notification events and their delivery over push, SMS and e-mail.
//!
//! The engine builds [`Notice`]s, [`fan_out`] turns them into one
//! [`NotificationEvent`] per eligible channel of every recipient, and the
//! [`Dispatcher`] hands each event to a [`Notifier`] transport.

mod dispatcher;
pub mod error;
mod http;
mod local;
#[cfg(test)]
pub mod recording;

pub use dispatcher::{Dispatcher, fan_out};
pub use error::NotifyError;
pub use http::HttpNotifier;
pub use local::{LogNotifier, Transport};

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state_machine::{Job, JobId, JobType, User, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Push,
    Sms,
    Email,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Push, Channel::Sms, Channel::Email];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Push => write!(f, "push"),
            Channel::Sms => write!(f, "sms"),
            Channel::Email => write!(f, "email"),
        }
    }
}

/// `*` for every eligible channel, or one named channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSelector {
    All,
    Only(Channel),
}

impl ChannelSelector {
    pub fn allows(self, channel: Channel) -> bool {
        match self {
            ChannelSelector::All => true,
            ChannelSelector::Only(c) => c == channel,
        }
    }
}

impl FromStr for ChannelSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "*" => Ok(ChannelSelector::All),
            "push" => Ok(ChannelSelector::Only(Channel::Push)),
            "sms" => Ok(ChannelSelector::Only(Channel::Sms)),
            "email" => Ok(ChannelSelector::Only(Channel::Email)),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientRole {
    Translator,
    Customer,
    Admin,
}

/// Who a notice goes to and how they can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: Option<UserId>,
    pub role: RecipientRole,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub push_enabled: bool,
}

impl Recipient {
    pub fn from_user(user: &User, role: RecipientRole) -> Self {
        Self {
            user_id: Some(user.id),
            role,
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            push_enabled: user.push_enabled,
        }
    }

    pub fn admin(email: String) -> Self {
        Self {
            user_id: None,
            role: RecipientRole::Admin,
            name: "admin".to_string(),
            email: Some(email),
            phone: None,
            push_enabled: false,
        }
    }

    /// Channels this recipient can actually be reached on.
    pub fn channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| self.address(*c).is_some())
            .collect()
    }

    /// Device target, phone number or e-mail address for `channel`.
    pub fn address(&self, channel: Channel) -> Option<String> {
        match channel {
            Channel::Push => (self.push_enabled)
                .then_some(self.user_id)
                .flatten()
                .map(|id| format!("user:{id}")),
            Channel::Sms => self.phone.clone().filter(|p| !p.trim().is_empty()),
            Channel::Email => self.email.clone().filter(|e| !e.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    NewJob,
    JobAccepted,
    AcceptConfirmed,
    JobReleased,
    JobCancelled,
    JobCompleted,
    JobChanged,
    Unaccepted,
    Reminder,
    BookingReceived,
}

/// The job fields included with every notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub language: String,
    pub duration_min: u32,
    pub due_at: DateTime<Utc>,
    pub immediate: bool,
    pub job_type: JobType,
    pub customer_id: UserId,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            language: job.from_language.clone(),
            duration_min: job.duration_min,
            due_at: job.scheduled_due_at,
            immediate: job.immediate,
            job_type: job.job_type,
            customer_id: job.customer_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub subject: String,
    pub message: String,
    pub job: JobSummary,
}

impl Notice {
    pub fn new(kind: NoticeKind, job: &Job) -> Self {
        let id = job.id;
        let due = job.scheduled_due_at.format("%Y-%m-%d %H:%M");
        let (subject, message) = match kind {
            NoticeKind::NewJob => (
                format!("New booking #{id}"),
                format!(
                    "New {} booking #{id} on {due} ({} min)",
                    job.from_language, job.duration_min
                ),
            ),
            NoticeKind::JobAccepted => (
                format!("Booking #{id} accepted"),
                format!("Your booking #{id} on {due} has been accepted by a translator"),
            ),
            NoticeKind::AcceptConfirmed => (
                format!("Booking #{id} confirmed"),
                format!("You have accepted booking #{id} on {due}"),
            ),
            NoticeKind::JobReleased => (
                format!("Booking #{id} cancelled"),
                format!("Booking #{id} on {due} was cancelled; you are released from it"),
            ),
            NoticeKind::JobCancelled => (
                format!("Booking #{id} cancelled"),
                format!("Your booking #{id} on {due} has been cancelled"),
            ),
            NoticeKind::JobCompleted => (
                format!("Booking #{id} completed"),
                match job.session_time {
                    Some(t) => format!("Booking #{id} has ended. Session time {t}"),
                    None => format!("Booking #{id} has ended"),
                },
            ),
            NoticeKind::JobChanged => (
                format!("Booking #{id} updated"),
                format!(
                    "Booking #{id} is now {} on {due} ({} min)",
                    job.from_language, job.duration_min
                ),
            ),
            NoticeKind::Unaccepted => (
                format!("Booking #{id} not accepted"),
                format!(
                    "Booking #{id} on {due} has no translator; deadline was {}",
                    job.will_expire_at.format("%Y-%m-%d %H:%M")
                ),
            ),
            NoticeKind::Reminder => (
                format!("Reminder: booking #{id}"),
                format!("Reminder: booking #{id} in {} on {due}", job.from_language),
            ),
            NoticeKind::BookingReceived => (
                format!("Thank you for your booking #{id}"),
                match &job.reference {
                    Some(reference) => format!(
                        "We have received your {} booking #{id} on {due} (reference {reference})",
                        job.from_language
                    ),
                    None => format!(
                        "We have received your {} booking #{id} on {due}",
                        job.from_language
                    ),
                },
            ),
        };
        Self {
            kind,
            subject,
            message,
            job: JobSummary::from(job),
        }
    }
}

/// A notice addressed to one recipient over one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub job_id: JobId,
    pub channel: Channel,
    pub recipient: Recipient,
    pub payload: Notice,
    pub sent_at: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(channel: Channel, recipient: Recipient, payload: Notice) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: payload.job.job_id,
            channel,
            recipient,
            payload,
            sent_at: Utc::now(),
        }
    }

    pub fn address(&self) -> Option<String> {
        self.recipient.address(self.channel)
    }
}

/// A delivery transport.
pub trait Notifier: Send + Sync + 'static {
    fn send(
        &self,
        event: &NotificationEvent,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}
