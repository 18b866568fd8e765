use super::error::NotifyError;
use super::{HttpNotifier, NotificationEvent, Notifier};

/// Writes every notification to the log instead of a provider.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let to = event.address().ok_or(NotifyError::NoAddress {
            channel: event.channel,
        })?;
        tracing::info!(
            job_id = event.job_id,
            channel = %event.channel,
            to = %to,
            subject = %event.payload.subject,
            "notification"
        );
        Ok(())
    }
}

/// Transport chosen at startup from the notification config.
pub enum Transport {
    Http(HttpNotifier),
    Log(LogNotifier),
}

impl Notifier for Transport {
    async fn send(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        match self {
            Transport::Http(n) => n.send(event).await,
            Transport::Log(n) => n.send(event).await,
        }
    }
}
