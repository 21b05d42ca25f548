//! Read-only access to account invoice history
//!
//! The invoices table is owned by the upstream gateway; this module only
//! queries it. Any storage failure surfaces as [`HistoryError`] so the
//! pipeline marks the event failed instead of approving on missing data.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::instrument;

use crate::error::HistoryError;
use crate::storage::PostgresClient;
use crate::types::{HistoricalInvoice, InvoiceStatus};

/// Query capability over an account's prior invoices.
#[async_trait]
pub trait InvoiceHistory: Send + Sync {
    /// The account's most recent invoices, newest first, at most `limit`.
    async fn recent_invoices(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoricalInvoice>, HistoryError>;

    /// Count of the account's rejected invoices.
    async fn rejected_invoice_count(&self, account_id: &str) -> Result<u64, HistoryError>;
}

/// PostgreSQL implementation reading the externally-owned `invoices` table.
#[derive(Clone)]
pub struct PostgresInvoiceHistory {
    client: PostgresClient,
}

impl PostgresInvoiceHistory {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InvoiceHistory for PostgresInvoiceHistory {
    #[instrument(skip(self), fields(account_id = %account_id))]
    async fn recent_invoices(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoricalInvoice>, HistoryError> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(HistoryError::Unavailable)?;

        let rows = conn
            .query(
                "SELECT amount_cents, status, created_at
                 FROM invoices
                 WHERE account_id = $1
                 ORDER BY created_at DESC
                 LIMIT $2",
                &[&account_id, &(limit as i64)],
            )
            .await
            .map_err(|e| HistoryError::Unavailable(e.into()))?;

        rows.into_iter()
            .map(|row| {
                let status: String = row.get("status");
                Ok(HistoricalInvoice {
                    amount_cents: row.get("amount_cents"),
                    status: parse_status(&status)?,
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(account_id = %account_id))]
    async fn rejected_invoice_count(&self, account_id: &str) -> Result<u64, HistoryError> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(HistoryError::Unavailable)?;

        let row = conn
            .query_one(
                "SELECT COUNT(*) AS total FROM invoices
                 WHERE account_id = $1 AND status = 'rejected'",
                &[&account_id],
            )
            .await
            .map_err(|e| HistoryError::Unavailable(e.into()))?;

        let total: i64 = row.get("total");
        Ok(total as u64)
    }
}

fn parse_status(raw: &str) -> Result<InvoiceStatus, HistoryError> {
    match raw {
        "pending" => Ok(InvoiceStatus::Pending),
        "approved" => Ok(InvoiceStatus::Approved),
        "rejected" => Ok(InvoiceStatus::Rejected),
        other => Err(HistoryError::Unavailable(anyhow::anyhow!(
            "unknown invoice status: {other}"
        ))),
    }
}

/// In-memory history for tests and local runs.
#[derive(Default)]
pub struct MemoryInvoiceHistory {
    invoices: Mutex<HashMap<String, Vec<HistoricalInvoice>>>,
}

impl MemoryInvoiceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an invoice to an account's history.
    pub fn push(&self, account_id: &str, invoice: HistoricalInvoice) {
        self.invoices
            .lock()
            .unwrap()
            .entry(account_id.to_string())
            .or_default()
            .push(invoice);
    }
}

#[async_trait]
impl InvoiceHistory for MemoryInvoiceHistory {
    async fn recent_invoices(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoricalInvoice>, HistoryError> {
        let invoices = self.invoices.lock().unwrap();
        let mut result = invoices.get(account_id).cloned().unwrap_or_default();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn rejected_invoice_count(&self, account_id: &str) -> Result<u64, HistoryError> {
        let invoices = self.invoices.lock().unwrap();
        Ok(invoices
            .get(account_id)
            .map(|list| {
                list.iter()
                    .filter(|i| i.status == InvoiceStatus::Rejected)
                    .count() as u64
            })
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn invoice(amount_cents: i64, status: InvoiceStatus, age_hours: i64) -> HistoricalInvoice {
        HistoricalInvoice {
            amount_cents,
            status,
            created_at: Utc::now() - Duration::hours(age_hours),
        }
    }

    #[tokio::test]
    async fn test_recent_invoices_newest_first_and_limited() {
        let history = MemoryInvoiceHistory::new();
        history.push("acc_1", invoice(100, InvoiceStatus::Approved, 3));
        history.push("acc_1", invoice(200, InvoiceStatus::Approved, 1));
        history.push("acc_1", invoice(300, InvoiceStatus::Approved, 2));

        let recent = history.recent_invoices("acc_1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].amount_cents, 200);
        assert_eq!(recent[1].amount_cents, 300);
    }

    #[tokio::test]
    async fn test_rejected_count() {
        let history = MemoryInvoiceHistory::new();
        history.push("acc_1", invoice(100, InvoiceStatus::Rejected, 1));
        history.push("acc_1", invoice(100, InvoiceStatus::Approved, 2));
        history.push("acc_1", invoice(100, InvoiceStatus::Rejected, 3));

        assert_eq!(history.rejected_invoice_count("acc_1").await.unwrap(), 2);
        assert_eq!(history.rejected_invoice_count("acc_2").await.unwrap(), 0);
    }
}
