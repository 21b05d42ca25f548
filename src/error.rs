//! Error taxonomy for the fraud-evaluation pipeline

use thiserror::Error;

/// A raw message that cannot become an [`InboundInvoiceEvent`].
///
/// Malformed events are dropped before any ledger interaction and are
/// terminal: redelivering them cannot succeed.
///
/// [`InboundInvoiceEvent`]: crate::types::InboundInvoiceEvent
#[derive(Debug, Error)]
pub enum MalformedEventError {
    #[error("missing or empty event_id")]
    MissingEventId,

    #[error("missing amount: neither amount_cents nor amount present")]
    MissingAmount,

    #[error("negative amount_cents: {0}")]
    NegativeAmount(i64),

    #[error("invalid message payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Failure of the idempotency ledger store, other than a uniqueness
/// conflict (conflicts are a regular claim outcome, not an error).
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger store error: {0}")]
    Store(anyhow::Error),
}

/// Failure to read an account's invoice history.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("invoice history unavailable: {0}")]
    Unavailable(anyhow::Error),
}

/// Failure to hand the outbound event to the broker's send path.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("result publish failed: {0}")]
    Transport(anyhow::Error),
}

/// Errors surfaced by one pipeline execution.
///
/// Everything except `Malformed` occurs after a successful claim and is
/// preceded by `mark_failed`, so the ledger reflects a retryable state
/// when the error reaches the consumer loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Malformed(#[from] MalformedEventError),

    #[error(transparent)]
    HistoryUnavailable(#[from] HistoryError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Persistence(#[from] LedgerError),
}

impl PipelineError {
    /// Whether redelivering the message can lead to a different outcome.
    ///
    /// Malformed payloads stay malformed; everything else is a transient
    /// storage or broker fault.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PipelineError::Malformed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_is_terminal() {
        let err = PipelineError::Malformed(MalformedEventError::MissingEventId);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_history_and_publish_are_retryable() {
        let history = PipelineError::HistoryUnavailable(HistoryError::Unavailable(
            anyhow::anyhow!("connection refused"),
        ));
        let publish = PipelineError::Publish(PublishError::Transport(anyhow::anyhow!(
            "broker down"
        )));
        assert!(history.is_retryable());
        assert!(publish.is_retryable());
    }
}
