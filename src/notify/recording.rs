//! In-memory notifier for tests.

use std::sync::Mutex;
use std::time::Duration;

use super::error::NotifyError;
use super::{Channel, NotificationEvent, Notifier};

/// Records delivered events; channels in `fail_channels` are rejected.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<NotificationEvent>>,
    fail_channels: Vec<Channel>,
    delay: Option<Duration>,
}

impl RecordingNotifier {
    pub fn failing(channels: &[Channel]) -> Self {
        Self {
            fail_channels: channels.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.sent.lock().unwrap().clone()
    }

    /// Polls until at least `n` events were delivered; false after two seconds.
    pub async fn wait_for(&self, n: usize) -> bool {
        for _ in 0..200 {
            if self.sent.lock().unwrap().len() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Notifier for RecordingNotifier {
    async fn send(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_channels.contains(&event.channel) {
            return Err(NotifyError::Rejected {
                channel: event.channel,
                status: 503,
                message: "provider unavailable".into(),
            });
        }
        self.sent.lock().unwrap().push(event.clone());
        Ok(())
    }
}
