//! Result publisher for processed-invoice events

use async_nats::jetstream;
use async_nats::HeaderMap;
use async_trait::async_trait;
use tracing::debug;

use crate::envelope::CORRELATION_HEADER;
use crate::error::PublishError;
use crate::types::ProcessedInvoiceEvent;

/// Send path for processed-invoice events.
///
/// A failed send must propagate so the pipeline marks the event FAILED;
/// completion is never recorded before the send succeeds.
#[async_trait]
pub trait ResultPublisher: Send + Sync {
    async fn publish(
        &self,
        event: &ProcessedInvoiceEvent,
        correlation_id: Option<&str>,
    ) -> Result<(), PublishError>;
}

/// JetStream publisher for the transaction-results subject
pub struct NatsResultPublisher {
    jetstream: jetstream::Context,
    subject: String,
}

impl NatsResultPublisher {
    pub fn new(jetstream: jetstream::Context, subject: &str) -> Self {
        Self {
            jetstream,
            subject: subject.to_string(),
        }
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[async_trait]
impl ResultPublisher for NatsResultPublisher {
    async fn publish(
        &self,
        event: &ProcessedInvoiceEvent,
        correlation_id: Option<&str>,
    ) -> Result<(), PublishError> {
        let payload =
            serde_json::to_vec(event).map_err(|e| PublishError::Transport(e.into()))?;

        let mut headers = HeaderMap::new();
        if let Some(request_id) = correlation_id {
            headers.insert(CORRELATION_HEADER, request_id);
        }

        // the returned future resolves once the broker acknowledges the
        // message; completion must not be recorded before that
        self.jetstream
            .publish_with_headers(self.subject.clone(), headers, payload.into())
            .await
            .map_err(|e| PublishError::Transport(e.into()))?
            .await
            .map_err(|e| PublishError::Transport(e.into()))?;

        debug!(
            event_id = %event.event_id,
            invoice_id = %event.invoice_id,
            status = ?event.status,
            "published processed invoice"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Publishing end to end needs a running NATS server; the pipeline
    // tests cover the send contract through a capturing publisher.
}
