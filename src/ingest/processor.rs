use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, IngestError};
use crate::ingest::SAVE_RETRIES;
use crate::queue::{Task, TaskKind, TaskQueue};
use crate::reconciliation::record::{
    extract_correlation_key, LifecycleStatus, SubPayment, VerificationStatus,
};
use crate::reconciliation::store::ReconciliationStore;

/// The only transaction sub-type this service reconciles. Other sub-types
/// flow through the same webhook endpoint and are ignored.
pub const RECOGNIZED_TRANSACTION_TYPE: &str = "p2m";

/// Payment-processor transaction event (source A).
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorEvent {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub transaction_type: Option<String>,
    pub invoice_number: Option<String>,
    #[serde(alias = "kycStatus")]
    pub kyc_status: Option<String>,
    pub transaction_id: Option<String>,
    pub id: Option<String>,
    #[serde(default)]
    pub payment_details: Vec<SubPaymentInput>,
    pub order_reference: Option<String>,
    pub client_uuid: Option<String>,
}

/// One sub-payment as it appears on the wire. Required fields are enforced
/// during normalization, not by serde, so one bad entry cannot reject the
/// whole event.
#[derive(Debug, Clone, Deserialize)]
pub struct SubPaymentInput {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub status: Option<String>,
}

impl ProcessorEvent {
    fn is_recognized_transaction(&self) -> bool {
        self.event_type.as_deref() == Some("transaction")
            && self.transaction_type.as_deref() == Some(RECOGNIZED_TRANSACTION_TYPE)
    }

    fn transaction_id(&self) -> Option<String> {
        self.transaction_id.clone().or_else(|| self.id.clone())
    }

    /// Normalize the wire entries: drop declined sub-payments (terminal at
    /// the processor, never stored) and entries missing required fields.
    fn normalized_sub_payments(&self) -> Vec<SubPayment> {
        self.payment_details
            .iter()
            .filter_map(|input| {
                let (Some(id), Some(kind), Some(amount), Some(status)) = (
                    input.id.clone(),
                    input.kind.clone(),
                    input.amount,
                    input.status.clone(),
                ) else {
                    warn!("Dropping sub-payment with missing fields: {:?}", input);
                    return None;
                };
                Some(SubPayment {
                    id,
                    kind,
                    amount,
                    currency: input.currency.clone(),
                    status,
                })
            })
            .filter(|sp| !sp.is_declined())
            .collect()
    }
}

/// Ingestion handler for processor transaction events.
pub struct ProcessorEventHandler {
    store: Arc<dyn ReconciliationStore>,
    queue: Arc<dyn TaskQueue>,
}

impl ProcessorEventHandler {
    pub fn new(store: Arc<dyn ReconciliationStore>, queue: Arc<dyn TaskQueue>) -> Self {
        Self { store, queue }
    }

    pub async fn handle(&self, payload: &Value) -> AppResult<()> {
        let event: ProcessorEvent = match serde_json::from_value(payload.clone()) {
            Ok(event) => event,
            Err(e) => {
                // malformed traffic is expected shape, not a failure
                warn!("Discarding unparseable processor event: {}", e);
                return Ok(());
            }
        };

        if !event.is_recognized_transaction() {
            debug!(
                "Skipping processor event of type {:?}/{:?}",
                event.event_type, event.transaction_type
            );
            return Ok(());
        }

        let Some(invoice_reference) = event.invoice_number.clone() else {
            warn!("Discarding processor event without invoice reference");
            return Ok(());
        };
        let Some(correlation_key) = extract_correlation_key(&invoice_reference) else {
            warn!(
                "Discarding processor event with malformed invoice reference: {}",
                invoice_reference
            );
            return Ok(());
        };

        let sub_payments = event.normalized_sub_payments();
        let verification_status = event
            .kyc_status
            .as_deref()
            .and_then(VerificationStatus::parse);

        for _ in 0..SAVE_RETRIES {
            let mut record = self
                .store
                .find_or_create(correlation_key, &invoice_reference)
                .await?;

            record.invoice_reference = invoice_reference.clone();
            record.processor_transaction_id = event.transaction_id();
            record.verification_status = verification_status;
            record.sub_payments = sub_payments.clone();
            record.order_reference = event.order_reference.clone();
            record.client_token = event.client_uuid.clone();
            record.processor_payload = Some(payload.clone());
            record.apply_derived_status(chrono::Utc::now());

            match self.store.save(&mut record).await {
                Ok(()) => {
                    info!(
                        correlation_key,
                        status = %record.lifecycle_status,
                        "Processor event applied"
                    );
                    // gated on the saved state, not the transition: a crash
                    // between save and enqueue recovers on the next duplicate
                    // delivery, and the orchestrator no-ops on extra tasks
                    if record.lifecycle_status == LifecycleStatus::Matched {
                        self.queue
                            .enqueue(Task::new(TaskKind::RecordPayment(record.id)))
                            .await?;
                    }
                    return Ok(());
                }
                Err(AppError::Conflict(_)) => {
                    debug!(correlation_key, "Lost save race, reloading");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(IngestError::ConflictRetriesExhausted(SAVE_RETRIES).into())
    }
}
