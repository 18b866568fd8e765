use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use super::error::NotifyError;
use super::{Channel, NotificationEvent, Notifier, NoticeKind};
use crate::config::NotificationConfig;
use crate::state_machine::JobId;

/// JSON body posted to a provider gateway.
#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    id: String,
    channel: Channel,
    to: String,
    kind: NoticeKind,
    subject: &'a str,
    message: &'a str,
    job_id: JobId,
}

/// Delivers notifications by posting them to per-channel HTTP gateways.
pub struct HttpNotifier {
    client: Client,
    api_key: String,
    push_url: Option<String>,
    sms_url: Option<String>,
    email_url: Option<String>,
}

impl HttpNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            push_url: config.push_url.clone(),
            sms_url: config.sms_url.clone(),
            email_url: config.email_url.clone(),
        })
    }

    fn url_for(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Push => self.push_url.as_deref(),
            Channel::Sms => self.sms_url.as_deref(),
            Channel::Email => self.email_url.as_deref(),
        }
    }
}

impl Notifier for HttpNotifier {
    async fn send(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let channel = event.channel;
        let url = self
            .url_for(channel)
            .ok_or(NotifyError::NotConfigured { channel })?;
        let to = event.address().ok_or(NotifyError::NoAddress { channel })?;

        let body = OutboundMessage {
            id: event.id.to_string(),
            channel,
            to,
            kind: event.payload.kind,
            subject: &event.payload.subject,
            message: &event.payload.message,
            job_id: event.job_id,
        };

        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(NotifyError::RateLimited {
                channel,
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(NotifyError::Rejected {
                channel,
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}
