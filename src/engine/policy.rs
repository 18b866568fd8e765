use crate::auth::Role;
use crate::state_machine::{Job, JobType, TranslatorLevel, User};

/// Decides which translators may see and take a job.
pub trait EligibilityPolicy: Send + Sync {
    fn is_eligible(&self, user: &User, job: &Job) -> bool;
}

/// Role, language, level and gender rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEligibility;

impl EligibilityPolicy for DefaultEligibility {
    fn is_eligible(&self, user: &User, job: &Job) -> bool {
        if user.role != Role::Translator || !user.speaks(&job.from_language) {
            return false;
        }

        // Translators without a recorded level only get unpaid work.
        let level_ok = match user.level {
            Some(level) => level.serves(job.job_type),
            None => job.job_type == JobType::Unpaid,
        };
        if !level_ok {
            return false;
        }

        if job.certified && user.level != Some(TranslatorLevel::Certified) {
            return false;
        }

        match job.gender {
            Some(wanted) => user.gender == Some(wanted),
            None => true,
        }
    }
}
