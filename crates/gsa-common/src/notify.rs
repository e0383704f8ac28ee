//! Notification capability.
//!
//! Two uses: operator alerts when a job is promoted to `failed` for
//! anything but a validation error, and user mails from the report
//! pipeline. Actual SMTP delivery is an external collaborator; the
//! in-tree implementations log the message or hand it to a webhook-style
//! relay. Notification failures never change job state.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Failed to deliver notification: {0}")]
    Delivery(String),
}

/// A message to be delivered out of band
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

pub type NotifierRef = Arc<dyn Notifier>;

/// Logs notifications instead of delivering them
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            recipient = %notification.recipient,
            subject = %notification.subject,
            "Notification (delivery disabled)"
        );
        Ok(())
    }
}

/// Posts notifications as JSON to a mail relay endpoint
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Delivery(format!(
                "relay returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Build the notifier from `MAIL_RELAY_URL`, falling back to logging
pub fn notifier_from_env() -> NotifierRef {
    match std::env::var("MAIL_RELAY_URL") {
        Ok(url) if !url.is_empty() => match WebhookNotifier::new(url) {
            Ok(notifier) => Arc::new(notifier),
            Err(err) => {
                tracing::warn!(error = %err, "Falling back to log-only notifications");
                Arc::new(LogNotifier)
            }
        },
        _ => Arc::new(LogNotifier),
    }
}

/// Notify the operator address about a failed job, when configured.
///
/// Validation failures are the caller's responsibility to exclude.
pub async fn alert_operator(notifier: &dyn Notifier, job_id: &str, description: &str) {
    let Ok(address) = std::env::var("MAIL_ERROR_ADDRESS") else {
        return;
    };
    if address.is_empty() {
        return;
    }

    let notification = Notification {
        recipient: address,
        subject: format!("GSA job {} failed", job_id),
        body: format!("Job {} was promoted to failed: {}", job_id, description),
    };
    if let Err(err) = notifier.send(&notification).await {
        tracing::error!(job_id, error = %err, "Failed to send operator alert");
    }
}
