//! Per-message fraud-evaluation pipeline
//!
//! Drives one inbound message through decode, claim, rule evaluation,
//! result publication and ledger commit, in that order. For a single
//! event id the sequence claim -> evaluate -> send (acked) -> complete
//! holds even under racing redeliveries; the ledger's unique insert is
//! the only synchronization.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::envelope;
use crate::error::PipelineError;
use crate::fraud::FraudEngine;
use crate::idempotency::{ClaimOutcome, IdempotencyGuard};
use crate::metrics::WorkerMetrics;
use crate::producer::ResultPublisher;
use crate::types::{FraudVerdict, InboundInvoiceEvent, ProcessedInvoiceEvent};

/// Result of one pipeline execution.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// The invoice was evaluated and its result published.
    Processed(FraudVerdict),
    /// A redelivery of an already-completed event was dropped.
    SkippedDuplicate,
}

/// The fraud-evaluation pipeline for pending-invoice messages.
pub struct InvoicePipeline {
    guard: IdempotencyGuard,
    engine: FraudEngine,
    publisher: Arc<dyn ResultPublisher>,
    metrics: Arc<WorkerMetrics>,
}

impl InvoicePipeline {
    pub fn new(
        guard: IdempotencyGuard,
        engine: FraudEngine,
        publisher: Arc<dyn ResultPublisher>,
        metrics: Arc<WorkerMetrics>,
    ) -> Self {
        Self {
            guard,
            engine,
            publisher,
            metrics,
        }
    }

    /// Process one raw message.
    ///
    /// Malformed payloads are dropped before any ledger interaction; every
    /// failure after a successful claim calls `mark_failed` before the
    /// error propagates, so the ledger always reflects a retryable state.
    pub async fn process(
        &self,
        payload: &[u8],
        correlation_id: Option<String>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let event = match envelope::decode(payload, correlation_id) {
            Ok(event) => event,
            Err(e) => {
                self.metrics.record_failed();
                warn!(error = %e, "dropping malformed pending-invoice message");
                return Err(e.into());
            }
        };

        let request_id = event.correlation_id.as_deref().unwrap_or("-");
        info!(
            invoice_id = %event.invoice_id,
            event_id = %event.event_id,
            request_id = %request_id,
            "processing invoice"
        );

        let claim = match self.guard.claim(&event.event_id).await {
            Ok(claim) => claim,
            Err(e) => {
                self.metrics.record_failed();
                error!(
                    event_id = %event.event_id,
                    request_id = %request_id,
                    error = %e,
                    "claim failed"
                );
                return Err(e.into());
            }
        };

        if claim == ClaimOutcome::SkipDuplicate {
            self.metrics.record_duplicate();
            info!(
                invoice_id = %event.invoice_id,
                event_id = %event.event_id,
                request_id = %request_id,
                "duplicate delivery skipped"
            );
            return Ok(PipelineOutcome::SkippedDuplicate);
        }

        let verdict = match self.engine.evaluate(&event).await {
            Ok(verdict) => verdict,
            Err(e) => return self.fail(&event, e.into()).await,
        };

        let outbound = ProcessedInvoiceEvent::new(&event, &verdict);
        if let Err(e) = self
            .publisher
            .publish(&outbound, event.correlation_id.as_deref())
            .await
        {
            return self.fail(&event, e.into()).await;
        }

        if let Err(e) = self.guard.mark_completed(&event.event_id).await {
            // the result is already out; leaving the ledger short of
            // COMPLETED means the redelivery re-evaluates, which is safe
            return self.fail(&event, e.into()).await;
        }

        self.metrics.record_processed(verdict.has_fraud);
        info!(
            invoice_id = %event.invoice_id,
            event_id = %event.event_id,
            request_id = %request_id,
            has_fraud = verdict.has_fraud,
            "invoice processed"
        );

        Ok(PipelineOutcome::Processed(verdict))
    }

    /// Record a post-claim failure in metrics and the ledger, then
    /// propagate the error for redelivery.
    async fn fail(
        &self,
        event: &InboundInvoiceEvent,
        err: PipelineError,
    ) -> Result<PipelineOutcome, PipelineError> {
        self.metrics.record_failed();
        error!(
            invoice_id = %event.invoice_id,
            event_id = %event.event_id,
            request_id = %event.correlation_id.as_deref().unwrap_or("-"),
            error = %err,
            "invoice failed"
        );

        if let Err(mark_err) = self
            .guard
            .mark_failed(&event.event_id, &err.to_string())
            .await
        {
            error!(
                event_id = %event.event_id,
                error = %mark_err,
                "could not record failure in ledger"
            );
        }

        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FraudConfig;
    use crate::error::{HistoryError, PublishError};
    use crate::storage::history::{InvoiceHistory, MemoryInvoiceHistory};
    use crate::storage::ledger::{EventStatus, LedgerStore, MemoryLedger};
    use crate::types::{HistoricalInvoice, InvoiceStatus, VerdictStatus};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingPublisher {
        sent: Mutex<Vec<(ProcessedInvoiceEvent, Option<String>)>>,
    }

    #[async_trait]
    impl ResultPublisher for CapturingPublisher {
        async fn publish(
            &self,
            event: &ProcessedInvoiceEvent,
            correlation_id: Option<&str>,
        ) -> Result<(), PublishError> {
            self.sent
                .lock()
                .unwrap()
                .push((event.clone(), correlation_id.map(|s| s.to_string())));
            Ok(())
        }
    }

    struct FailingPublisher;

    #[async_trait]
    impl ResultPublisher for FailingPublisher {
        async fn publish(
            &self,
            _event: &ProcessedInvoiceEvent,
            _correlation_id: Option<&str>,
        ) -> Result<(), PublishError> {
            Err(PublishError::Transport(anyhow::anyhow!("broker down")))
        }
    }

    struct FailingHistory;

    #[async_trait]
    impl InvoiceHistory for FailingHistory {
        async fn recent_invoices(
            &self,
            _account_id: &str,
            _limit: usize,
        ) -> Result<Vec<HistoricalInvoice>, HistoryError> {
            Err(HistoryError::Unavailable(anyhow::anyhow!(
                "storage unavailable"
            )))
        }

        async fn rejected_invoice_count(&self, _account_id: &str) -> Result<u64, HistoryError> {
            Err(HistoryError::Unavailable(anyhow::anyhow!(
                "storage unavailable"
            )))
        }
    }

    struct Harness {
        pipeline: InvoicePipeline,
        ledger: Arc<MemoryLedger>,
        publisher: Arc<CapturingPublisher>,
        metrics: Arc<WorkerMetrics>,
    }

    fn harness(history: Arc<dyn InvoiceHistory>) -> Harness {
        let ledger = Arc::new(MemoryLedger::new());
        let publisher = Arc::new(CapturingPublisher::default());
        let metrics = Arc::new(WorkerMetrics::new());
        let pipeline = InvoicePipeline::new(
            IdempotencyGuard::new(ledger.clone()),
            FraudEngine::new(history, &FraudConfig::default()),
            publisher.clone(),
            metrics.clone(),
        );
        Harness {
            pipeline,
            ledger,
            publisher,
            metrics,
        }
    }

    fn payload(event_id: &str, amount_cents: i64) -> Vec<u8> {
        format!(
            r#"{{"event_id":"{event_id}","account_id":"acc_1","invoice_id":"inv_1","amount_cents":{amount_cents}}}"#
        )
        .into_bytes()
    }

    fn seeded_history(amounts: &[i64]) -> Arc<MemoryInvoiceHistory> {
        let history = Arc::new(MemoryInvoiceHistory::new());
        for (i, &amount) in amounts.iter().enumerate() {
            history.push(
                "acc_1",
                HistoricalInvoice {
                    amount_cents: amount,
                    status: InvoiceStatus::Approved,
                    created_at: Utc::now() - Duration::hours(100 + i as i64),
                },
            );
        }
        history
    }

    #[tokio::test]
    async fn test_clean_invoice_is_approved_and_completed() {
        let h = harness(seeded_history(&[100, 100, 100]));

        let outcome = h.pipeline.process(&payload("evt_1", 120), None).await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::Processed(v) if !v.has_fraud));

        let sent = h.publisher.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        // round-trip: outbound ids equal inbound, status tracks the verdict
        assert_eq!(sent[0].0.event_id, "evt_1");
        assert_eq!(sent[0].0.invoice_id, "inv_1");
        assert_eq!(sent[0].0.status, VerdictStatus::Approved);
        drop(sent);

        let record = h.ledger.get("evt_1").await.unwrap().unwrap();
        assert_eq!(record.status, EventStatus::Completed);

        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.processed_total, 1);
        assert_eq!(snapshot.approved_total, 1);
        assert_eq!(snapshot.failed_total, 0);
    }

    #[tokio::test]
    async fn test_fraudulent_invoice_is_rejected() {
        let h = harness(seeded_history(&[100, 100, 100]));

        let outcome = h.pipeline.process(&payload("evt_1", 1000), None).await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::Processed(v) if v.has_fraud));

        let sent = h.publisher.sent.lock().unwrap();
        assert_eq!(sent[0].0.status, VerdictStatus::Rejected);
        drop(sent);

        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.rejected_total, 1);
    }

    #[tokio::test]
    async fn test_empty_event_id_never_touches_ledger() {
        let h = harness(seeded_history(&[]));

        let payload =
            br#"{"event_id":"","account_id":"acc_1","invoice_id":"inv_1","amount":10.0}"#;
        let err = h.pipeline.process(payload, None).await.unwrap_err();

        assert!(!err.is_retryable());
        assert!(h.ledger.get("").await.unwrap().is_none());
        assert!(h.publisher.sent.lock().unwrap().is_empty());
        assert_eq!(h.metrics.snapshot().failed_total, 1);
    }

    #[tokio::test]
    async fn test_completed_event_publishes_exactly_once() {
        let h = harness(seeded_history(&[100, 100, 100]));

        h.pipeline.process(&payload("evt_1", 120), None).await.unwrap();
        let outcome = h.pipeline.process(&payload("evt_1", 120), None).await.unwrap();

        assert_eq!(outcome, PipelineOutcome::SkippedDuplicate);
        assert_eq!(h.publisher.sent.lock().unwrap().len(), 1);

        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.processed_total, 1);
        assert_eq!(snapshot.duplicate_total, 1);
        assert_eq!(snapshot.failed_total, 0);
    }

    #[tokio::test]
    async fn test_history_failure_marks_failed_and_publishes_nothing() {
        let h = harness(Arc::new(FailingHistory));

        let err = h.pipeline.process(&payload("evt_1", 100), None).await.unwrap_err();

        assert!(err.is_retryable());
        assert!(h.publisher.sent.lock().unwrap().is_empty());

        let record = h.ledger.get("evt_1").await.unwrap().unwrap();
        assert_eq!(record.status, EventStatus::Failed);
        assert!(record.last_error.is_some());
        assert_eq!(h.metrics.snapshot().failed_total, 1);
    }

    #[tokio::test]
    async fn test_publish_failure_stays_retryable() {
        let ledger = Arc::new(MemoryLedger::new());
        let metrics = Arc::new(WorkerMetrics::new());
        let pipeline = InvoicePipeline::new(
            IdempotencyGuard::new(ledger.clone()),
            FraudEngine::new(seeded_history(&[100, 100, 100]), &FraudConfig::default()),
            Arc::new(FailingPublisher),
            metrics.clone(),
        );

        let err = pipeline.process(&payload("evt_1", 120), None).await.unwrap_err();

        assert!(err.is_retryable());
        let record = ledger.get("evt_1").await.unwrap().unwrap();
        assert_eq!(record.status, EventStatus::Failed);
        assert_eq!(metrics.snapshot().processed_total, 0);
    }

    #[tokio::test]
    async fn test_failed_event_succeeds_on_redelivery() {
        let ledger = Arc::new(MemoryLedger::new());
        let metrics = Arc::new(WorkerMetrics::new());
        let history = seeded_history(&[100, 100, 100]);

        let failing = InvoicePipeline::new(
            IdempotencyGuard::new(ledger.clone()),
            FraudEngine::new(history.clone(), &FraudConfig::default()),
            Arc::new(FailingPublisher),
            metrics.clone(),
        );
        failing.process(&payload("evt_1", 120), None).await.unwrap_err();

        let publisher = Arc::new(CapturingPublisher::default());
        let recovered = InvoicePipeline::new(
            IdempotencyGuard::new(ledger.clone()),
            FraudEngine::new(history, &FraudConfig::default()),
            publisher.clone(),
            metrics.clone(),
        );
        let outcome = recovered.process(&payload("evt_1", 120), None).await.unwrap();

        assert!(matches!(outcome, PipelineOutcome::Processed(_)));
        assert_eq!(publisher.sent.lock().unwrap().len(), 1);
        let record = ledger.get("evt_1").await.unwrap().unwrap();
        assert_eq!(record.status, EventStatus::Completed);
    }

    #[tokio::test]
    async fn test_correlation_id_propagates_to_publisher() {
        let h = harness(seeded_history(&[]));

        h.pipeline
            .process(&payload("evt_1", 100), Some("req-42".to_string()))
            .await
            .unwrap();

        let sent = h.publisher.sent.lock().unwrap();
        assert_eq!(sent[0].1.as_deref(), Some("req-42"));
    }
}
