use anyhow::{Context, Result};
use async_nats::Client;
use async_trait::async_trait;
use tracing::{debug, info};

use super::messages::SessionResultMessage;
use crate::registry::ResultSink;
use crate::session::SessionSnapshot;

/// Publishes completed session results on `<prefix>.<device_id>`
pub struct NatsResultPublisher {
    client: Client,
    subject_prefix: String,
}

impl NatsResultPublisher {
    /// Connect to NATS server
    pub async fn connect(url: &str, subject_prefix: impl Into<String>) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            subject_prefix: subject_prefix.into(),
        })
    }

    pub fn subject_for(&self, device_id: &str) -> String {
        result_subject(&self.subject_prefix, device_id)
    }
}

/// NATS subject for a device's results; `.`, `*`, `>` and whitespace in the
/// device id are replaced so it stays a single token
pub fn result_subject(prefix: &str, device_id: &str) -> String {
    let token: String = device_id
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    format!("{}.{}", prefix, token)
}

#[async_trait]
impl ResultSink for NatsResultPublisher {
    async fn publish(&self, result: &SessionSnapshot) -> Result<()> {
        let message = SessionResultMessage::from_snapshot(result)
            .with_context(|| format!("Session {} has not finished", result.session_id))?;
        let subject = self.subject_for(&result.device_id);
        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish session result")?;

        debug!(
            "Published result for session {} to {} (outcome={:?})",
            message.session_id, subject, message.outcome
        );

        Ok(())
    }

    fn name(&self) -> &str {
        "nats"
    }
}
