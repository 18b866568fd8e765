use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{Gender, JobId, JobType, SessionTime, UserId};
use crate::auth::Role;

/// Qualification level of a translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslatorLevel {
    Professional,
    Certified,
    Layman,
}

impl TranslatorLevel {
    /// Paid jobs go to professionals, RWS jobs to certified translators,
    /// unpaid jobs to volunteers (laymen).
    pub fn serves(self, job_type: JobType) -> bool {
        matches!(
            (self, job_type),
            (TranslatorLevel::Professional, JobType::Paid)
                | (TranslatorLevel::Certified, JobType::Paid)
                | (TranslatorLevel::Certified, JobType::Rws)
                | (TranslatorLevel::Layman, JobType::Unpaid)
        )
    }
}

/// A platform user as known to the user directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default = "default_true")]
    pub push_enabled: bool,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub level: Option<TranslatorLevel>,
    #[serde(default)]
    pub gender: Option<Gender>,
}

fn default_true() -> bool {
    true
}

impl User {
    pub fn speaks(&self, language: &str) -> bool {
        self.languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language))
    }
}

/// Per-job travel and session bookkeeping kept by admins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceRecord {
    pub job_id: JobId,
    pub distance: Option<String>,
    pub time: Option<String>,
    pub session_time: Option<SessionTime>,
    pub updated_at: DateTime<Utc>,
}

impl DistanceRecord {
    pub fn new(job_id: JobId, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            distance: None,
            time: None,
            session_time: None,
            updated_at: now,
        }
    }
}
