//! Envelope codec for inbound pending-invoice messages
//!
//! Decodes the broker payload into an [`InboundInvoiceEvent`], normalizing
//! monetary fields to integer minor units and extracting the correlation
//! header. Decoding happens before any side effect: a malformed message
//! never reaches the idempotency ledger.

use async_nats::HeaderMap;
use serde::Deserialize;

use crate::error::MalformedEventError;
use crate::types::InboundInvoiceEvent;

/// Transport header carrying the correlation id across systems.
pub const CORRELATION_HEADER: &str = "x-request-id";

/// Wire shape of the pending-invoices topic.
///
/// `amount` is decimal major units, `amount_cents` integer minor units.
/// When both are present the integer form is authoritative.
#[derive(Debug, Deserialize)]
struct PendingInvoiceMessage {
    #[serde(default)]
    event_id: Option<String>,
    account_id: String,
    invoice_id: String,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    amount_cents: Option<i64>,
}

/// Decode a raw payload into an [`InboundInvoiceEvent`].
pub fn decode(
    payload: &[u8],
    correlation_id: Option<String>,
) -> Result<InboundInvoiceEvent, MalformedEventError> {
    let message: PendingInvoiceMessage = serde_json::from_slice(payload)?;

    let event_id = match message.event_id {
        Some(id) if !id.is_empty() => id,
        _ => return Err(MalformedEventError::MissingEventId),
    };

    let amount_cents = match (message.amount_cents, message.amount) {
        (Some(cents), _) => cents,
        (None, Some(amount)) => to_minor_units(amount),
        (None, None) => return Err(MalformedEventError::MissingAmount),
    };
    if amount_cents < 0 {
        return Err(MalformedEventError::NegativeAmount(amount_cents));
    }

    Ok(InboundInvoiceEvent {
        event_id,
        invoice_id: message.invoice_id,
        account_id: message.account_id,
        amount_cents,
        correlation_id,
    })
}

/// Convert a decimal major-unit amount to minor units, rounding half away
/// from zero.
fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Extract the correlation id from transport headers.
///
/// Absent or empty headers are valid and yield `None`.
pub fn correlation_from_headers(headers: Option<&HeaderMap>) -> Option<String> {
    headers
        .and_then(|h| h.get(CORRELATION_HEADER))
        .map(|value| value.as_str().to_string())
        .filter(|value| !value.is_empty())
}
