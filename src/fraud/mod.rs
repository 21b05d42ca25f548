//! Fraud rule engine
//!
//! Fetches a read-only history snapshot for the event's account and runs
//! the rule aggregate over it. A failed history read is surfaced, never
//! treated as a clean account.

pub mod specifications;

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::config::FraudConfig;
use crate::error::HistoryError;
use crate::storage::history::InvoiceHistory;
use crate::types::{AccountHistory, FraudVerdict, InboundInvoiceEvent};

pub use specifications::{
    has_rejection_streak, FraudAggregate, FraudHit, FraudSpecification,
    FrequentHighValueSpecification, RuleContext, SuspiciousAccountSpecification,
    UnusualAmountSpecification,
};

/// Evaluates invoices against the configured rule aggregate.
pub struct FraudEngine {
    history: Arc<dyn InvoiceHistory>,
    rules: FraudAggregate,
    /// Upper bound on how many recent invoices any rule inspects
    fetch_limit: usize,
}

impl FraudEngine {
    pub fn new(history: Arc<dyn InvoiceHistory>, config: &FraudConfig) -> Self {
        let rules = FraudAggregate {
            unusual_amount: UnusualAmountSpecification {
                variation_percentage: config.suspicious_variation_percentage,
                history_window: config.invoices_history_count,
            },
            frequent_high_value: FrequentHighValueSpecification {
                suspicious_count: config.suspicious_invoices_count,
                timeframe_hours: config.suspicious_timeframe_hours,
            },
            suspicious_account: SuspiciousAccountSpecification {
                rejected_count: config.suspicious_rejected_count,
            },
        };
        // the frequency rule only needs to see threshold-many invoices;
        // the amount rule needs its window
        let fetch_limit = config
            .invoices_history_count
            .max(config.suspicious_invoices_count);

        Self {
            history,
            rules,
            fetch_limit,
        }
    }

    /// Evaluate one invoice event.
    ///
    /// Pure given the fetched snapshot: no history mutation, deterministic
    /// for identical inputs, and an empty history simply triggers no rule.
    pub async fn evaluate(
        &self,
        event: &InboundInvoiceEvent,
    ) -> Result<FraudVerdict, HistoryError> {
        let invoices = self
            .history
            .recent_invoices(&event.account_id, self.fetch_limit)
            .await?;
        let rejected_total = self
            .history
            .rejected_invoice_count(&event.account_id)
            .await?;

        let snapshot = AccountHistory {
            invoices,
            rejected_total,
        };
        let ctx = RuleContext {
            event,
            history: &snapshot,
            now: Utc::now(),
        };

        let verdict = self.rules.evaluate(&ctx);
        debug!(
            invoice_id = %event.invoice_id,
            account_id = %event.account_id,
            has_fraud = verdict.has_fraud,
            reason = ?verdict.reason,
            "fraud rules evaluated"
        );
        Ok(verdict)
    }
}
