mod job;
mod state;
mod user;

#[cfg(test)]
pub use job::Gender;
pub use job::{Job, JobId, JobSpec, JobStatus, JobType, SessionTime, UserId, will_expire_at};
pub use state::{Action, StateMachine, Transition};
pub use user::{DistanceRecord, TranslatorLevel, User};
