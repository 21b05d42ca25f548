//! Idempotency guard over the processed-events ledger
//!
//! Per event id the ledger moves `(none) -> PROCESSING -> {COMPLETED |
//! FAILED}`; `FAILED -> PROCESSING` re-enters on retry and `COMPLETED` is
//! terminal. The claim is race-free because the store's unique insert is
//! the only synchronization primitive: two workers claiming the same id
//! see exactly one `Inserted`.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::LedgerError;
use crate::storage::ledger::{EventStatus, InsertOutcome, LedgerStore};

/// What the caller should do after claiming an event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// First delivery, or retry of a previously incomplete attempt.
    Proceed,
    /// The event already ran to completion; drop without re-publishing.
    SkipDuplicate,
}

/// Claims event ids before evaluation and records their terminal state.
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn LedgerStore>,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Reserve `event_id` for processing.
    ///
    /// Insert-first, then fall back to reading the conflicting row: a
    /// `COMPLETED` row means the event is a duplicate; `PROCESSING` or
    /// `FAILED` means a previous attempt never finished and this delivery
    /// retries it.
    pub async fn claim(&self, event_id: &str) -> Result<ClaimOutcome, LedgerError> {
        if self.store.insert_processing(event_id).await? == InsertOutcome::Inserted {
            return Ok(ClaimOutcome::Proceed);
        }

        match self.store.get(event_id).await? {
            None => {
                // row vanished between insert and read; take the claim anew
                warn!(event_id = %event_id, "ledger row disappeared after conflict, re-claiming");
                self.store.insert_processing(event_id).await?;
                Ok(ClaimOutcome::Proceed)
            }
            Some(record) if record.status == EventStatus::Completed => {
                debug!(event_id = %event_id, "event already completed, skipping");
                Ok(ClaimOutcome::SkipDuplicate)
            }
            Some(record) => {
                debug!(
                    event_id = %event_id,
                    previous_status = record.status.as_str(),
                    "retrying incomplete event"
                );
                self.store
                    .update_status(event_id, EventStatus::Processing, None)
                    .await?;
                Ok(ClaimOutcome::Proceed)
            }
        }
    }

    /// Record successful completion. Only valid after the outbound send
    /// has been acknowledged.
    pub async fn mark_completed(&self, event_id: &str) -> Result<(), LedgerError> {
        self.store
            .update_status(event_id, EventStatus::Completed, None)
            .await
    }

    /// Record a failed attempt; the event stays retryable.
    pub async fn mark_failed(&self, event_id: &str, error: &str) -> Result<(), LedgerError> {
        self.store
            .update_status(event_id, EventStatus::Failed, Some(error))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ledger::MemoryLedger;

    fn guard() -> (IdempotencyGuard, Arc<MemoryLedger>) {
        let store = Arc::new(MemoryLedger::new());
        (IdempotencyGuard::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_first_claim_proceeds() {
        let (guard, store) = guard();

        assert_eq!(guard.claim("evt_1").await.unwrap(), ClaimOutcome::Proceed);

        let record = store.get("evt_1").await.unwrap().unwrap();
        assert_eq!(record.status, EventStatus::Processing);
    }

    #[tokio::test]
    async fn test_completed_event_skips() {
        let (guard, _) = guard();

        guard.claim("evt_1").await.unwrap();
        guard.mark_completed("evt_1").await.unwrap();

        assert_eq!(
            guard.claim("evt_1").await.unwrap(),
            ClaimOutcome::SkipDuplicate
        );
    }

    #[tokio::test]
    async fn test_completed_is_terminal() {
        let (guard, store) = guard();

        guard.claim("evt_1").await.unwrap();
        guard.mark_completed("evt_1").await.unwrap();
        guard.claim("evt_1").await.unwrap();

        let record = store.get("evt_1").await.unwrap().unwrap();
        assert_eq!(record.status, EventStatus::Completed);
    }

    #[tokio::test]
    async fn test_failed_event_retries() {
        let (guard, store) = guard();

        guard.claim("evt_1").await.unwrap();
        guard.mark_failed("evt_1", "history unavailable").await.unwrap();

        assert_eq!(guard.claim("evt_1").await.unwrap(), ClaimOutcome::Proceed);

        let record = store.get("evt_1").await.unwrap().unwrap();
        assert_eq!(record.status, EventStatus::Processing);
        assert_eq!(record.last_error, None);
    }

    #[tokio::test]
    async fn test_in_flight_event_reenters_processing() {
        let (guard, store) = guard();

        guard.claim("evt_1").await.unwrap();
        // second delivery while the first is still PROCESSING
        assert_eq!(guard.claim("evt_1").await.unwrap(), ClaimOutcome::Proceed);

        let record = store.get("evt_1").await.unwrap().unwrap();
        assert_eq!(record.status, EventStatus::Processing);
    }

    #[tokio::test]
    async fn test_concurrent_claims_never_double_complete() {
        let (guard, store) = guard();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let guard = guard.clone();
            handles.push(tokio::spawn(async move {
                guard.claim("evt_race").await.unwrap()
            }));
        }

        let mut proceed = 0;
        for handle in handles {
            if handle.await.unwrap() == ClaimOutcome::Proceed {
                proceed += 1;
            }
        }

        // every claim before completion is Proceed (first claim or retry),
        // but the store inserted exactly one row
        assert!(proceed >= 1);
        let record = store.get("evt_race").await.unwrap().unwrap();
        assert_eq!(record.status, EventStatus::Processing);

        // once completed, later deliveries skip
        guard.mark_completed("evt_race").await.unwrap();
        assert_eq!(
            guard.claim("evt_race").await.unwrap(),
            ClaimOutcome::SkipDuplicate
        );
    }
}
