//! Processing metrics for the anti-fraud worker
//!
//! Counters move at exactly two decision points: after a successful
//! evaluation (split into approved/rejected) and on any failure path.
//! Duplicate deliveries are a third, separately counted outcome that joins
//! neither bucket. Exposed as an instantaneous snapshot and as Prometheus
//! text exposition; both are read-only.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use serde::Serialize;
use tracing::info;

/// Metrics collector for the worker
pub struct WorkerMetrics {
    registry: Registry,
    processed_total: IntCounter,
    approved_total: IntCounter,
    rejected_total: IntCounter,
    failed_total: IntCounter,
    duplicate_total: IntCounter,
    last_processed_timestamp: IntGauge,
    last_processed_at: RwLock<Option<DateTime<Utc>>>,
    started_at: Instant,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let processed_total = IntCounter::new(
            "antifraud_processed_total",
            "Invoices that completed fraud evaluation",
        )
        .expect("metric definition");
        let approved_total = IntCounter::new(
            "antifraud_approved_total",
            "Evaluated invoices with no fraud detected",
        )
        .expect("metric definition");
        let rejected_total = IntCounter::new(
            "antifraud_rejected_total",
            "Evaluated invoices flagged as fraudulent",
        )
        .expect("metric definition");
        let failed_total = IntCounter::new(
            "antifraud_failed_total",
            "Events that failed processing (malformed or errored)",
        )
        .expect("metric definition");
        let duplicate_total = IntCounter::new(
            "antifraud_duplicate_total",
            "Redelivered events skipped by the idempotency guard",
        )
        .expect("metric definition");
        let last_processed_timestamp = IntGauge::new(
            "antifraud_last_processed_timestamp_seconds",
            "Unix timestamp of the last processed or failed event",
        )
        .expect("metric definition");

        for counter in [
            &processed_total,
            &approved_total,
            &rejected_total,
            &failed_total,
            &duplicate_total,
        ] {
            registry
                .register(Box::new(counter.clone()))
                .expect("metric registration");
        }
        registry
            .register(Box::new(last_processed_timestamp.clone()))
            .expect("metric registration");

        Self {
            registry,
            processed_total,
            approved_total,
            rejected_total,
            failed_total,
            duplicate_total,
            last_processed_timestamp,
            last_processed_at: RwLock::new(None),
            started_at: Instant::now(),
        }
    }

    /// Record a completed evaluation.
    pub fn record_processed(&self, has_fraud: bool) {
        self.processed_total.inc();
        if has_fraud {
            self.rejected_total.inc();
        } else {
            self.approved_total.inc();
        }
        self.touch();
    }

    /// Record a failed event (malformed or errored after claim).
    pub fn record_failed(&self) {
        self.failed_total.inc();
        self.touch();
    }

    /// Record a duplicate delivery skipped by the idempotency guard.
    pub fn record_duplicate(&self) {
        self.duplicate_total.inc();
    }

    fn touch(&self) {
        let now = Utc::now();
        self.last_processed_timestamp.set(now.timestamp());
        if let Ok(mut last) = self.last_processed_at.write() {
            *last = Some(now);
        }
    }

    /// Instantaneous view of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            processed_total: self.processed_total.get(),
            approved_total: self.approved_total.get(),
            rejected_total: self.rejected_total.get(),
            failed_total: self.failed_total.get(),
            duplicate_total: self.duplicate_total.get(),
            last_processed_at: *self.last_processed_at.read().unwrap(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    /// Prometheus text exposition of all registered metrics.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            info!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for WorkerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time counter values
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub processed_total: u64,
    pub approved_total: u64,
    pub rejected_total: u64,
    pub failed_total: u64,
    pub duplicate_total: u64,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub uptime_seconds: u64,
}

/// Periodically logs a metrics summary
pub struct MetricsReporter {
    metrics: std::sync::Arc<WorkerMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: std::sync::Arc<WorkerMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        loop {
            interval.tick().await;
            let snapshot = self.metrics.snapshot();
            info!(
                processed = snapshot.processed_total,
                approved = snapshot.approved_total,
                rejected = snapshot.rejected_total,
                failed = snapshot.failed_total,
                duplicates = snapshot.duplicate_total,
                uptime_seconds = snapshot.uptime_seconds,
                "metrics summary"
            );
        }
    }
}
