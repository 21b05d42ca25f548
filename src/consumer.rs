//! JetStream consumer for pending-invoice events
//!
//! Delivery is at-least-once: messages are acked only after the pipeline
//! finishes, so anything unacked (or NAK'd) comes back for retry and the
//! idempotency guard makes the redelivery safe.

use anyhow::Result;
use async_nats::jetstream;
use async_nats::jetstream::consumer::pull;
use async_nats::jetstream::consumer::AckPolicy;
use tracing::info;

use crate::config::NatsConfig;

/// Consumer for receiving pending invoices from JetStream
pub struct InvoiceConsumer {
    jetstream: jetstream::Context,
    stream_name: String,
    subject: String,
    durable_name: String,
}

impl InvoiceConsumer {
    /// Create a new invoice consumer
    pub fn new(jetstream: jetstream::Context, config: &NatsConfig) -> Self {
        Self {
            jetstream,
            stream_name: config.pending_stream.clone(),
            subject: config.pending_subject.clone(),
            durable_name: config.durable_name.clone(),
        }
    }

    /// Ensure the stream and durable consumer exist and return the
    /// message stream.
    pub async fn messages(&self) -> Result<pull::Stream> {
        let stream = self
            .jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: self.stream_name.clone(),
                subjects: vec![self.subject.clone()],
                ..Default::default()
            })
            .await?;

        let consumer = stream
            .get_or_create_consumer(
                &self.durable_name,
                pull::Config {
                    durable_name: Some(self.durable_name.clone()),
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await?;

        info!(
            stream = %self.stream_name,
            subject = %self.subject,
            durable = %self.durable_name,
            "subscribed to pending invoices"
        );

        Ok(consumer.messages().await?)
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[cfg(test)]
mod tests {
    // Integration tests would require a running NATS server
}
