//! Idempotency ledger store: one row per event id
//!
//! The store's only synchronization primitive is the uniqueness constraint
//! on `event_id`. `insert_processing` must be atomic and report a conflict
//! as a regular outcome so the guard can distinguish "claimed" from
//! "already seen".

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::error::LedgerError;
use crate::storage::PostgresClient;

/// Ledger status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Processing,
    Completed,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Processing => "PROCESSING",
            EventStatus::Completed => "COMPLETED",
            EventStatus::Failed => "FAILED",
        }
    }

    fn parse(raw: &str) -> Result<Self, LedgerError> {
        match raw {
            "PROCESSING" => Ok(EventStatus::Processing),
            "COMPLETED" => Ok(EventStatus::Completed),
            "FAILED" => Ok(EventStatus::Failed),
            other => Err(LedgerError::Store(anyhow::anyhow!(
                "unknown ledger status: {other}"
            ))),
        }
    }
}

/// One ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedEventRecord {
    pub event_id: String,
    pub status: EventStatus,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of an atomic unique insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Conflict,
}

/// Persistence seam for the idempotency ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Atomically insert a `PROCESSING` row for `event_id`; report a
    /// uniqueness conflict instead of failing.
    async fn insert_processing(&self, event_id: &str) -> Result<InsertOutcome, LedgerError>;

    /// Read the row for `event_id`, if any.
    async fn get(&self, event_id: &str) -> Result<Option<ProcessedEventRecord>, LedgerError>;

    /// Update status and error message of an existing row.
    async fn update_status(
        &self,
        event_id: &str,
        status: EventStatus,
        last_error: Option<&str>,
    ) -> Result<(), LedgerError>;
}

/// PostgreSQL implementation over the `processed_events` table.
#[derive(Clone)]
pub struct PostgresLedger {
    client: PostgresClient,
}

impl PostgresLedger {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedger {
    #[instrument(skip(self), fields(event_id = %event_id))]
    async fn insert_processing(&self, event_id: &str) -> Result<InsertOutcome, LedgerError> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(LedgerError::Store)?;

        let rows = conn
            .execute(
                "INSERT INTO processed_events (event_id, status, last_error, updated_at)
                 VALUES ($1, 'PROCESSING', NULL, NOW())
                 ON CONFLICT (event_id) DO NOTHING",
                &[&event_id],
            )
            .await
            .map_err(|e| LedgerError::Store(e.into()))?;

        if rows > 0 {
            debug!(event_id = %event_id, "event claimed");
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::Conflict)
        }
    }

    async fn get(&self, event_id: &str) -> Result<Option<ProcessedEventRecord>, LedgerError> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(LedgerError::Store)?;

        let row = conn
            .query_opt(
                "SELECT event_id, status, last_error, updated_at
                 FROM processed_events WHERE event_id = $1",
                &[&event_id],
            )
            .await
            .map_err(|e| LedgerError::Store(e.into()))?;

        match row {
            None => Ok(None),
            Some(row) => {
                let status: String = row.get("status");
                Ok(Some(ProcessedEventRecord {
                    event_id: row.get("event_id"),
                    status: EventStatus::parse(&status)?,
                    last_error: row.get("last_error"),
                    updated_at: row.get("updated_at"),
                }))
            }
        }
    }

    #[instrument(skip(self, last_error), fields(event_id = %event_id, status = status.as_str()))]
    async fn update_status(
        &self,
        event_id: &str,
        status: EventStatus,
        last_error: Option<&str>,
    ) -> Result<(), LedgerError> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(LedgerError::Store)?;

        conn.execute(
            "UPDATE processed_events
             SET status = $2, last_error = $3, updated_at = NOW()
             WHERE event_id = $1",
            &[&event_id, &status.as_str(), &last_error],
        )
        .await
        .map_err(|e| LedgerError::Store(e.into()))?;

        Ok(())
    }
}

/// In-memory ledger for tests and local runs.
///
/// A single mutex stands in for the database's uniqueness constraint;
/// insert-if-absent is atomic under it.
#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<HashMap<String, ProcessedEventRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn insert_processing(&self, event_id: &str) -> Result<InsertOutcome, LedgerError> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(event_id) {
            return Ok(InsertOutcome::Conflict);
        }
        records.insert(
            event_id.to_string(),
            ProcessedEventRecord {
                event_id: event_id.to_string(),
                status: EventStatus::Processing,
                last_error: None,
                updated_at: Utc::now(),
            },
        );
        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, event_id: &str) -> Result<Option<ProcessedEventRecord>, LedgerError> {
        Ok(self.records.lock().unwrap().get(event_id).cloned())
    }

    async fn update_status(
        &self,
        event_id: &str,
        status: EventStatus,
        last_error: Option<&str>,
    ) -> Result<(), LedgerError> {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(event_id) {
            record.status = status;
            record.last_error = last_error.map(|e| e.to_string());
            record.updated_at = Utc::now();
        }
        Ok(())
    }
}
