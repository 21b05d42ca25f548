//! Type definitions for the anti-fraud worker

pub mod event;

pub use event::{
    AccountHistory, FraudReason, FraudVerdict, HistoricalInvoice, InboundInvoiceEvent,
    InvoiceStatus, ProcessedInvoiceEvent, VerdictStatus,
};
