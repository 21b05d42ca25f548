//! Fraud rule specifications and their aggregate
//!
//! Each rule is a pure function of the event, a read-only history snapshot
//! and its configured thresholds. The aggregate combines the rules by
//! logical OR in a fixed order; the first hit supplies the verdict's
//! reason and description.

use chrono::{DateTime, Duration, Utc};

use crate::types::{AccountHistory, FraudReason, FraudVerdict, InboundInvoiceEvent};

/// Inputs shared by every rule evaluation.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub event: &'a InboundInvoiceEvent,
    pub history: &'a AccountHistory,
    /// Evaluation instant, captured once per pipeline run
    pub now: DateTime<Utc>,
}

/// A triggered rule.
#[derive(Debug, Clone, PartialEq)]
pub struct FraudHit {
    pub reason: FraudReason,
    pub description: String,
}

/// The capability every fraud rule implements.
pub trait FraudSpecification {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<FraudHit>;
}

/// Flags amounts that deviate too far from the account's recent mean.
///
/// Needs at least 2 prior invoices for a baseline; below that it never
/// fires.
#[derive(Debug, Clone)]
pub struct UnusualAmountSpecification {
    /// Allowed relative deviation, in percent
    pub variation_percentage: f64,
    /// How many recent invoices form the baseline
    pub history_window: usize,
}

impl FraudSpecification for UnusualAmountSpecification {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<FraudHit> {
        let window: Vec<i64> = ctx
            .history
            .invoices
            .iter()
            .take(self.history_window)
            .map(|invoice| invoice.amount_cents)
            .collect();

        if window.len() < 2 {
            return None;
        }

        let mean = window.iter().sum::<i64>() as f64 / window.len() as f64;
        let deviation = ((ctx.event.amount_cents as f64 - mean).abs() / mean) * 100.0;

        if deviation > self.variation_percentage {
            Some(FraudHit {
                reason: FraudReason::UnusualAmount,
                description: format!(
                    "amount {} deviates {:.1}% from the account mean {:.0} (allowed {:.1}%)",
                    ctx.event.amount_cents, deviation, mean, self.variation_percentage
                ),
            })
        } else {
            None
        }
    }
}

/// Flags accounts issuing too many invoices within the timeframe.
#[derive(Debug, Clone)]
pub struct FrequentHighValueSpecification {
    /// Invoice count that becomes suspicious
    pub suspicious_count: usize,
    /// Lookback window in hours
    pub timeframe_hours: i64,
}

impl FraudSpecification for FrequentHighValueSpecification {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<FraudHit> {
        let since = ctx.now - Duration::hours(self.timeframe_hours);
        let recent = ctx
            .history
            .invoices
            .iter()
            .filter(|invoice| invoice.created_at >= since)
            .count();

        if recent >= self.suspicious_count {
            Some(FraudHit {
                reason: FraudReason::FrequentHighValue,
                description: format!(
                    "{} invoices within the last {}h (threshold {})",
                    recent, self.timeframe_hours, self.suspicious_count
                ),
            })
        } else {
            None
        }
    }
}

/// Flags accounts with a history of rejected invoices.
#[derive(Debug, Clone)]
pub struct SuspiciousAccountSpecification {
    /// Rejected-invoice count that becomes suspicious
    pub rejected_count: u64,
}

/// The account-level predicate behind [`SuspiciousAccountSpecification`].
///
/// Kept as a named function so the concrete signal can be swapped without
/// touching the aggregate or the pipeline.
pub fn has_rejection_streak(history: &AccountHistory, threshold: u64) -> bool {
    threshold > 0 && history.rejected_total >= threshold
}

impl FraudSpecification for SuspiciousAccountSpecification {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<FraudHit> {
        if has_rejection_streak(ctx.history, self.rejected_count) {
            Some(FraudHit {
                reason: FraudReason::SuspiciousAccount,
                description: format!(
                    "{} rejected invoices on record (threshold {})",
                    ctx.history.rejected_total, self.rejected_count
                ),
            })
        } else {
            None
        }
    }
}

/// Composite evaluator: unusual amount, then frequency, then account
/// suspicion. Any hit marks the invoice fraudulent.
#[derive(Debug, Clone)]
pub struct FraudAggregate {
    pub unusual_amount: UnusualAmountSpecification,
    pub frequent_high_value: FrequentHighValueSpecification,
    pub suspicious_account: SuspiciousAccountSpecification,
}

impl FraudAggregate {
    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> FraudVerdict {
        let hit = self
            .unusual_amount
            .evaluate(ctx)
            .or_else(|| self.frequent_high_value.evaluate(ctx))
            .or_else(|| self.suspicious_account.evaluate(ctx));

        match hit {
            Some(hit) => FraudVerdict::fraudulent(hit.reason, hit.description),
            None => FraudVerdict::clean(),
        }
    }
}
