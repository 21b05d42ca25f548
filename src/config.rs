//! Configuration management for the anti-fraud worker

use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub fraud: FraudConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// NATS / JetStream connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub url: String,
    /// JetStream stream holding pending invoices
    #[serde(default = "default_pending_stream")]
    pub pending_stream: String,
    /// Subject for incoming pending invoices
    #[serde(default = "default_pending_subject")]
    pub pending_subject: String,
    /// Subject for outgoing processed-invoice results
    #[serde(default = "default_result_subject")]
    pub result_subject: String,
    /// Durable consumer name
    #[serde(default = "default_durable_name")]
    pub durable_name: String,
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_pending_stream() -> String {
    "ANTIFRAUD_PENDING".to_string()
}

fn default_pending_subject() -> String {
    "pending_transactions".to_string()
}

fn default_result_subject() -> String {
    "transactions_result".to_string()
}

fn default_durable_name() -> String {
    "antifraud-worker".to_string()
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: default_nats_url(),
            pending_stream: default_pending_stream(),
            pending_subject: default_pending_subject(),
            result_subject: default_result_subject(),
            durable_name: default_durable_name(),
        }
    }
}

/// PostgreSQL connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_name")]
    pub dbname: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Maximum number of pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "antifraud".to_string()
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_pool_size() -> usize {
    8
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            dbname: default_db_name(),
            user: default_db_user(),
            password: String::new(),
            pool_size: default_pool_size(),
        }
    }
}

/// Fraud rule thresholds, all runtime-tunable
#[derive(Debug, Clone, Deserialize)]
pub struct FraudConfig {
    /// Allowed deviation from the account's mean amount, in percent
    #[serde(default = "default_variation_percentage")]
    pub suspicious_variation_percentage: f64,
    /// How many recent invoices form the unusual-amount baseline
    #[serde(default = "default_history_count")]
    pub invoices_history_count: usize,
    /// Invoice count within the timeframe that becomes suspicious
    #[serde(default = "default_suspicious_count")]
    pub suspicious_invoices_count: usize,
    /// Lookback window for the frequency rule, in hours
    #[serde(default = "default_timeframe_hours")]
    pub suspicious_timeframe_hours: i64,
    /// Rejected-invoice count that marks an account suspicious
    #[serde(default = "default_rejected_count")]
    pub suspicious_rejected_count: u64,
}

fn default_variation_percentage() -> f64 {
    50.0
}

fn default_history_count() -> usize {
    5
}

fn default_suspicious_count() -> usize {
    3
}

fn default_timeframe_hours() -> i64 {
    24
}

fn default_rejected_count() -> u64 {
    2
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            suspicious_variation_percentage: default_variation_percentage(),
            invoices_history_count: default_history_count(),
            suspicious_invoices_count: default_suspicious_count(),
            suspicious_timeframe_hours: default_timeframe_hours(),
            suspicious_rejected_count: default_rejected_count(),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of messages processed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Seconds between metrics summary logs
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

fn default_workers() -> usize {
    4
}

fn default_report_interval() -> u64 {
    30
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            report_interval_secs: default_report_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig::default(),
            database: DatabaseConfig::default(),
            fraud: FraudConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
