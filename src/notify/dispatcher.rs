use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::error::NotifyError;
use super::{Channel, ChannelSelector, Notice, NotificationEvent, Notifier, Recipient};
use crate::state_machine::{JobId, UserId};

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResult {
    pub event_id: Uuid,
    pub job_id: JobId,
    pub channel: Channel,
    pub recipient: Option<UserId>,
    pub delivered: bool,
    pub error: Option<String>,
}

impl DeliveryResult {
    fn new(event: &NotificationEvent, outcome: Result<(), NotifyError>) -> Self {
        Self {
            event_id: event.id,
            job_id: event.job_id,
            channel: event.channel,
            recipient: event.recipient.user_id,
            delivered: outcome.is_ok(),
            error: outcome.err().map(|e| e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryReport {
    pub results: Vec<DeliveryResult>,
}

impl DeliveryReport {
    #[cfg(test)]
    pub fn all_delivered(&self) -> bool {
        self.results.iter().all(|r| r.delivered)
    }

    pub fn failures(&self) -> impl Iterator<Item = &DeliveryResult> {
        self.results.iter().filter(|r| !r.delivered)
    }

    pub fn first_error(&self) -> Option<&str> {
        self.failures().find_map(|r| r.error.as_deref())
    }
}

/// One event per recipient and reachable channel allowed by `selector`.
pub fn fan_out(
    recipients: &[Recipient],
    notice: &Notice,
    selector: ChannelSelector,
) -> Vec<NotificationEvent> {
    recipients
        .iter()
        .flat_map(|r| {
            r.channels()
                .into_iter()
                .filter(move |c| selector.allows(*c))
                .map(move |c| NotificationEvent::new(c, r.clone(), notice.clone()))
        })
        .collect()
}

/// Delivers events through a [`Notifier`] with a per-attempt timeout.
pub struct Dispatcher<N> {
    notifier: Arc<N>,
    timeout: Duration,
}

impl<N: Notifier> Dispatcher<N> {
    pub fn new(notifier: N, timeout: Duration) -> Self {
        Self {
            notifier: Arc::new(notifier),
            timeout,
        }
    }

    #[cfg(test)]
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Sends every event concurrently and waits for all of them.
    ///
    /// Results come back in the order of `events`.
    pub async fn deliver(&self, events: Vec<NotificationEvent>) -> DeliveryReport {
        let mut set = JoinSet::new();
        let count = events.len();
        for (idx, event) in events.into_iter().enumerate() {
            let notifier = Arc::clone(&self.notifier);
            let limit = self.timeout;
            set.spawn(async move {
                let outcome = match tokio::time::timeout(limit, notifier.send(&event)).await {
                    Ok(result) => result,
                    Err(_) => Err(NotifyError::Timeout {
                        channel: event.channel,
                    }),
                };
                (idx, DeliveryResult::new(&event, outcome))
            });
        }

        let mut slots: Vec<Option<DeliveryResult>> = vec![None; count];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, result)) => {
                    if let Some(error) = &result.error {
                        tracing::debug!(job_id = result.job_id, channel = %result.channel, %error, "delivery attempt failed");
                    }
                    slots[idx] = Some(result);
                }
                Err(e) => tracing::error!(error = %e, "notification task panicked"),
            }
        }

        DeliveryReport {
            results: slots.into_iter().flatten().collect(),
        }
    }

    /// Delivers in the background; the caller never waits on providers.
    pub fn spawn(self: &Arc<Self>, events: Vec<NotificationEvent>) {
        if events.is_empty() {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let report = this.deliver(events).await;
            for failure in report.failures() {
                tracing::warn!(
                    job_id = failure.job_id,
                    channel = %failure.channel,
                    recipient = ?failure.recipient,
                    error = failure.error.as_deref().unwrap_or_default(),
                    "background notification not delivered"
                );
            }
        });
    }
}
