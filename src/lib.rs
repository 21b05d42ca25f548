//! Anti-Fraud Worker Library
//!
//! An asynchronous worker that consumes pending-invoice events, evaluates
//! them against a composite set of fraud rules over account history, and
//! publishes an approved/rejected result exactly once per event.

pub mod config;
pub mod consumer;
pub mod envelope;
pub mod error;
pub mod fraud;
pub mod idempotency;
pub mod metrics;
pub mod pipeline;
pub mod producer;
pub mod storage;
pub mod types;

pub use config::AppConfig;
pub use consumer::InvoiceConsumer;
pub use error::PipelineError;
pub use fraud::FraudEngine;
pub use idempotency::{ClaimOutcome, IdempotencyGuard};
pub use metrics::{MetricsSnapshot, WorkerMetrics};
pub use pipeline::{InvoicePipeline, PipelineOutcome};
pub use producer::{NatsResultPublisher, ResultPublisher};
pub use types::{FraudVerdict, InboundInvoiceEvent, ProcessedInvoiceEvent};
