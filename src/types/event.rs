//! Event and verdict data structures for invoice fraud evaluation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version stamped on every outbound processed-invoice event.
pub const SCHEMA_VERSION: i32 = 2;

/// A pending-invoice event after envelope decoding.
///
/// Amounts are normalized to integer minor units (cents); the decimal
/// major-unit form never leaves the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundInvoiceEvent {
    /// Unique event identifier, the idempotency key
    pub event_id: String,
    /// Invoice this event refers to
    pub invoice_id: String,
    /// Account that owns the invoice
    pub account_id: String,
    /// Invoice amount in minor units
    pub amount_cents: i64,
    /// Correlation id carried on the `x-request-id` transport header
    pub correlation_id: Option<String>,
}

/// Lifecycle status of an invoice as recorded by the upstream gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Approved,
    Rejected,
}

/// A prior invoice of an account, as read from external storage.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalInvoice {
    pub amount_cents: i64,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
}

/// Read-only snapshot of an account's invoice history.
///
/// `invoices` is ordered most recent first and bounded by the query that
/// produced it; `rejected_total` counts all rejected invoices of the
/// account, not just those in the window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountHistory {
    pub invoices: Vec<HistoricalInvoice>,
    pub rejected_total: u64,
}

/// Why an invoice was flagged as fraudulent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudReason {
    UnusualAmount,
    FrequentHighValue,
    SuspiciousAccount,
}

/// Aggregate outcome of rule evaluation for one invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct FraudVerdict {
    pub has_fraud: bool,
    pub reason: Option<FraudReason>,
    pub description: Option<String>,
}

impl FraudVerdict {
    /// A verdict with no triggered rule.
    pub fn clean() -> Self {
        Self {
            has_fraud: false,
            reason: None,
            description: None,
        }
    }

    /// A verdict for a triggered rule.
    pub fn fraudulent(reason: FraudReason, description: impl Into<String>) -> Self {
        Self {
            has_fraud: true,
            reason: Some(reason),
            description: Some(description.into()),
        }
    }

    /// Outbound wire status for this verdict.
    pub fn status(&self) -> VerdictStatus {
        if self.has_fraud {
            VerdictStatus::Rejected
        } else {
            VerdictStatus::Approved
        }
    }
}

/// Wire status carried by the processed-invoice event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Approved,
    Rejected,
}

/// Outbound event published after an invoice has been evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedInvoiceEvent {
    pub schema_version: i32,
    pub event_id: String,
    pub invoice_id: String,
    pub status: VerdictStatus,
}

impl ProcessedInvoiceEvent {
    pub fn new(event: &InboundInvoiceEvent, verdict: &FraudVerdict) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            event_id: event.event_id.clone(),
            invoice_id: event.invoice_id.clone(),
            status: verdict.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> InboundInvoiceEvent {
        InboundInvoiceEvent {
            event_id: "evt_1".to_string(),
            invoice_id: "inv_1".to_string(),
            account_id: "acc_1".to_string(),
            amount_cents: 1250,
            correlation_id: None,
        }
    }

    #[test]
    fn test_processed_event_wire_format() {
        let event = sample_event();
        let verdict = FraudVerdict::fraudulent(FraudReason::UnusualAmount, "spike");
        let out = ProcessedInvoiceEvent::new(&event, &verdict);

        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["schema_version"], 2);
        assert_eq!(json["event_id"], "evt_1");
        assert_eq!(json["invoice_id"], "inv_1");
        assert_eq!(json["status"], "rejected");
    }

    #[test]
    fn test_clean_verdict_is_approved() {
        let event = sample_event();
        let out = ProcessedInvoiceEvent::new(&event, &FraudVerdict::clean());
        assert_eq!(out.status, VerdictStatus::Approved);
        assert_eq!(
            serde_json::to_value(&out).unwrap()["status"],
            "approved"
        );
    }

    #[test]
    fn test_fraud_reason_serialization() {
        assert_eq!(
            serde_json::to_value(FraudReason::FrequentHighValue).unwrap(),
            "FREQUENT_HIGH_VALUE"
        );
    }
}
