//! Demo Invoice Producer
//!
//! Generates and publishes pending-invoice events to JetStream for
//! exercising the worker end to end.

use async_nats::jetstream;
use async_nats::HeaderMap;
use rand::Rng;
use serde::Serialize;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Pending-invoice event matching the worker's expected format
#[derive(Debug, Clone, Serialize)]
struct PendingInvoice {
    event_id: String,
    account_id: String,
    invoice_id: String,
    amount: f64,
}

/// Invoice generator for demo traffic
struct InvoiceGenerator {
    rng: rand::rngs::ThreadRng,
    accounts: Vec<String>,
}

impl InvoiceGenerator {
    fn new(account_count: usize) -> Self {
        Self {
            rng: rand::thread_rng(),
            accounts: (0..account_count).map(|i| format!("acc_{i:04}")).collect(),
        }
    }

    /// Generate an ordinary invoice within the typical amount band
    fn generate_ordinary(&mut self) -> PendingInvoice {
        let account = self.accounts[self.rng.gen_range(0..self.accounts.len())].clone();
        PendingInvoice {
            event_id: Uuid::new_v4().to_string(),
            account_id: account,
            invoice_id: Uuid::new_v4().to_string(),
            amount: self.rng.gen_range(10.0..500.0),
        }
    }

    /// Generate an anomalous invoice far above the typical band
    fn generate_anomalous(&mut self) -> PendingInvoice {
        let account = self.accounts[self.rng.gen_range(0..self.accounts.len())].clone();
        PendingInvoice {
            event_id: Uuid::new_v4().to_string(),
            account_id: account,
            invoice_id: Uuid::new_v4().to_string(),
            amount: self.rng.gen_range(5_000.0..50_000.0),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("invoice_producer=info".parse()?),
        )
        .init();

    info!("Starting Demo Invoice Producer");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args
        .get(1)
        .map(|s| s.as_str())
        .unwrap_or("nats://localhost:4222");
    let subject = args
        .get(2)
        .map(|s| s.as_str())
        .unwrap_or("pending_transactions");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let anomaly_rate: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0.1);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        anomaly_rate = anomaly_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = async_nats::connect(nats_url).await?;
    let jetstream = jetstream::new(client);
    info!("Connected to NATS");

    let mut generator = InvoiceGenerator::new(20);
    let mut rng = rand::thread_rng();

    info!("Starting to publish {} invoices...", count);

    let mut ordinary_count = 0;
    let mut anomalous_count = 0;

    for i in 0..count {
        let invoice = if rng.gen_bool(anomaly_rate) {
            anomalous_count += 1;
            generator.generate_anomalous()
        } else {
            ordinary_count += 1;
            generator.generate_ordinary()
        };

        let payload = serde_json::to_vec(&invoice)?;

        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", Uuid::new_v4().to_string().as_str());

        jetstream
            .publish_with_headers(subject.to_string(), headers, payload.into())
            .await?
            .await?;

        if (i + 1) % 10 == 0 {
            info!(
                "Published {}/{} invoices ({} ordinary, {} anomalous)",
                i + 1,
                count,
                ordinary_count,
                anomalous_count
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! Published {} invoices ({} ordinary, {} anomalous)",
        count, ordinary_count, anomalous_count
    );

    Ok(())
}
