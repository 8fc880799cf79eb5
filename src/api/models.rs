use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::reconciliation::record::PaymentRecord;

/// Webhook response - receipt is acknowledged immediately, processing is
/// queued.
#[derive(Debug, Serialize)]
pub struct WebhookAcceptedResponse {
    pub status: String,
    pub message: String,
    pub webhook_id: String,
}

impl WebhookAcceptedResponse {
    pub fn new(webhook_id: String) -> Self {
        Self {
            status: "accepted".to_string(),
            message: "Webhook received and queued for processing".to_string(),
            webhook_id,
        }
    }
}

/// Operator view of a payment record's reconciliation state.
#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub correlation_key: String,
    pub invoice_reference: String,
    pub lifecycle_status: String,
    pub ledger_order_id: Option<String>,
    pub processor_transaction_id: Option<String>,
    pub recording_attempts: i32,
    pub last_error: Option<String>,
    pub matched_at: Option<DateTime<Utc>>,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl From<PaymentRecord> for PaymentStatusResponse {
    fn from(record: PaymentRecord) -> Self {
        Self {
            correlation_key: record.correlation_key,
            invoice_reference: record.invoice_reference,
            lifecycle_status: record.lifecycle_status.as_str().to_string(),
            ledger_order_id: record.ledger_order_id,
            processor_transaction_id: record.processor_transaction_id,
            recording_attempts: record.recording_attempts,
            last_error: record.last_error,
            matched_at: record.matched_at,
            recorded_at: record.recorded_at,
        }
    }
}
