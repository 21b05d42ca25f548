//! Anti-Fraud Worker - Main Entry Point
//!
//! Consumes pending invoices from JetStream, evaluates fraud rules against
//! account history, and publishes processed results. Messages are acked
//! only after the pipeline completes; retryable failures are NAK'd.

use antifraud_worker::{
    config::AppConfig,
    consumer::InvoiceConsumer,
    envelope,
    fraud::FraudEngine,
    idempotency::IdempotencyGuard,
    metrics::{MetricsReporter, WorkerMetrics},
    pipeline::InvoicePipeline,
    producer::NatsResultPublisher,
    storage::{PostgresClient, PostgresInvoiceHistory, PostgresLedger},
};
use anyhow::Result;
use async_nats::jetstream;
use async_nats::jetstream::AckKind;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("antifraud_worker=info".parse()?),
        )
        .init();

    info!("Starting Anti-Fraud Worker");

    // Load configuration
    let config = AppConfig::load()?;
    info!("Configuration loaded successfully");
    info!(
        "Fraud thresholds: variation {:.1}%, history window {}, {} invoices / {}h, {} rejections",
        config.fraud.suspicious_variation_percentage,
        config.fraud.invoices_history_count,
        config.fraud.suspicious_invoices_count,
        config.fraud.suspicious_timeframe_hours,
        config.fraud.suspicious_rejected_count,
    );

    // Initialize metrics
    let metrics = Arc::new(WorkerMetrics::new());

    // Connect to PostgreSQL
    let postgres = PostgresClient::new(&config.database)?;
    postgres.ping().await?;
    info!(
        "Connected to PostgreSQL at {}:{}",
        config.database.host, config.database.port
    );

    let ledger = Arc::new(PostgresLedger::new(postgres.clone()));
    let history = Arc::new(PostgresInvoiceHistory::new(postgres));

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url).await?;
    let jetstream = jetstream::new(client);
    info!("Connected to NATS at {}", config.nats.url);

    // Initialize consumer, publisher and pipeline
    let consumer = InvoiceConsumer::new(jetstream.clone(), &config.nats);
    let publisher = Arc::new(NatsResultPublisher::new(
        jetstream,
        &config.nats.result_subject,
    ));
    let pipeline = Arc::new(InvoicePipeline::new(
        IdempotencyGuard::new(ledger),
        FraudEngine::new(history, &config.fraud),
        publisher,
        metrics.clone(),
    ));

    let num_workers = config.pipeline.workers;
    info!(
        "Starting invoice processing loop with {} parallel workers",
        num_workers
    );
    info!("Listening on subject: {}", config.nats.pending_subject);
    info!("Publishing results to: {}", config.nats.result_subject);

    // Semaphore to limit concurrent processing
    let semaphore = Arc::new(Semaphore::new(num_workers));

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let report_interval = config.pipeline.report_interval_secs;
    tokio::spawn(async move {
        let reporter = MetricsReporter::new(metrics_clone, report_interval);
        reporter.start().await;
    });

    // Process invoices in parallel
    let mut messages = consumer.messages().await?;

    while let Some(message) = messages.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "failed to receive message");
                continue;
            }
        };

        // Acquire permit (limits concurrent tasks)
        let permit = semaphore.clone().acquire_owned().await?;
        let pipeline = pipeline.clone();

        tokio::spawn(async move {
            let correlation_id = envelope::correlation_from_headers(message.headers.as_ref());

            match pipeline.process(&message.payload, correlation_id).await {
                Ok(_) => {
                    if let Err(e) = message.ack().await {
                        warn!(error = %e, "failed to ack message");
                    }
                }
                Err(e) if e.is_retryable() => {
                    // leave the event for redelivery; the idempotency
                    // guard makes the retry safe
                    if let Err(nak_err) = message.ack_with(AckKind::Nak(None)).await {
                        warn!(error = %nak_err, "failed to nak message");
                    }
                }
                Err(e) => {
                    // terminal failure: redelivery cannot help
                    error!(error = %e, "dropping unprocessable message");
                    if let Err(ack_err) = message.ack().await {
                        warn!(error = %ack_err, "failed to ack message");
                    }
                }
            }

            drop(permit);
        });
    }

    info!("Worker shutting down...");
    let snapshot = metrics.snapshot();
    info!(
        processed = snapshot.processed_total,
        approved = snapshot.approved_total,
        rejected = snapshot.rejected_total,
        failed = snapshot.failed_total,
        duplicates = snapshot.duplicate_total,
        "final metrics"
    );

    Ok(())
}
