//! Admin partial update of a job's distance record and metadata.
//!
//! Clients send loosely typed values (`"true"`, `"yes"`, `1`, `""`), so every
//! field is read as a [`Scalar`] and normalised exactly once in
//! [`DistanceFeedRequest::validate`]. Empty strings count as absent.

use serde::Deserialize;

use crate::error::BookingError;
use crate::state_machine::{JobId, SessionTime};
use crate::store::{DistancePatch, JobPatch};

/// A JSON string, number or boolean.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl Scalar {
    /// Trimmed text; `None` for blank strings.
    fn text(&self) -> Option<String> {
        let s = match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(s) => s.trim().to_string(),
        };
        (!s.is_empty()).then_some(s)
    }

    fn flag(&self, field: &str) -> Result<Option<bool>, BookingError> {
        match self {
            Scalar::Bool(b) => Ok(Some(*b)),
            _ => match self.text().map(|s| s.to_ascii_lowercase()).as_deref() {
                None => Ok(None),
                Some("true" | "yes" | "1") => Ok(Some(true)),
                Some("false" | "no" | "0") => Ok(Some(false)),
                Some(other) => Err(BookingError::validation(format!(
                    "{field} must be true or false, got {other:?}"
                ))),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DistanceFeedRequest {
    #[serde(alias = "job_id")]
    pub jobid: Option<Scalar>,
    pub distance: Option<Scalar>,
    pub time: Option<Scalar>,
    pub session_time: Option<Scalar>,
    #[serde(alias = "admin_comment")]
    pub admincomment: Option<Scalar>,
    pub flagged: Option<Scalar>,
    pub manually_handled: Option<Scalar>,
    pub by_admin: Option<Scalar>,
}

/// The two independent writes a feed request turns into.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataUpdate {
    pub job_id: JobId,
    pub distance: DistancePatch,
    pub job: JobPatch,
}

fn text(field: &Option<Scalar>) -> Option<String> {
    field.as_ref().and_then(Scalar::text)
}

fn flag(field: &Option<Scalar>, name: &str) -> Result<Option<bool>, BookingError> {
    match field {
        Some(v) => v.flag(name),
        None => Ok(None),
    }
}

impl DistanceFeedRequest {
    pub fn validate(&self) -> Result<MetadataUpdate, BookingError> {
        let job_id = text(&self.jobid)
            .ok_or_else(|| BookingError::validation("jobid is required"))?
            .parse::<JobId>()
            .map_err(|_| BookingError::validation("jobid must be a number"))?;

        let comment = text(&self.admincomment);
        let flagged = flag(&self.flagged, "flagged")?;
        if flagged == Some(true) && comment.is_none() {
            return Err(BookingError::validation("comment required when flagging"));
        }

        let session_time = text(&self.session_time)
            .map(|s| s.parse::<SessionTime>())
            .transpose()
            .map_err(BookingError::Validation)?;

        Ok(MetadataUpdate {
            job_id,
            distance: DistancePatch {
                distance: text(&self.distance),
                time: text(&self.time),
                session_time,
            },
            job: JobPatch {
                admin_comments: comment,
                flagged,
                manually_handled: flag(&self.manually_handled, "manually_handled")?,
                by_admin: flag(&self.by_admin, "by_admin")?,
                session_time,
                ..Default::default()
            },
        })
    }
}
