use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, IngestError};
use crate::ingest::{json_string, SAVE_RETRIES};
use crate::queue::{Task, TaskKind, TaskQueue};
use crate::reconciliation::record::{format_invoice_reference, LifecycleStatus};
use crate::reconciliation::store::ReconciliationStore;

/// Order-system external-id update (source B). The payload may wrap the
/// order fields in an `order` envelope or carry them at the top level.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderEvent {
    pub cart_token: Option<String>,
    /// Ledger order id; some senders emit it as a JSON number
    pub external_id: Option<Value>,
}

impl OrderEvent {
    fn from_payload(payload: &Value) -> Result<Self, serde_json::Error> {
        let data = payload.get("order").unwrap_or(payload);
        serde_json::from_value(data.clone())
    }
}

/// Ingestion handler for order external-id updates.
pub struct OrderEventHandler {
    store: Arc<dyn ReconciliationStore>,
    queue: Arc<dyn TaskQueue>,
}

impl OrderEventHandler {
    pub fn new(store: Arc<dyn ReconciliationStore>, queue: Arc<dyn TaskQueue>) -> Self {
        Self { store, queue }
    }

    pub async fn handle(&self, payload: &Value) -> AppResult<()> {
        let event = match OrderEvent::from_payload(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("Discarding unparseable order event: {}", e);
                return Ok(());
            }
        };

        let (Some(correlation_key), Some(ledger_order_id)) = (
            event.cart_token.clone(),
            event.external_id.as_ref().and_then(json_string),
        ) else {
            warn!(
                "Discarding order event missing cart token or external id: cart_token={:?}",
                event.cart_token
            );
            return Ok(());
        };

        let invoice_reference = format_invoice_reference(&correlation_key);

        for _ in 0..SAVE_RETRIES {
            let mut record = self
                .store
                .find_or_create(&correlation_key, &invoice_reference)
                .await?;

            record.ledger_order_id = Some(ledger_order_id.clone());
            record.order_payload = Some(payload.clone());
            record.apply_derived_status(chrono::Utc::now());

            match self.store.save(&mut record).await {
                Ok(()) => {
                    info!(
                        %correlation_key,
                        %ledger_order_id,
                        status = %record.lifecycle_status,
                        "Order event applied"
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
                    debug!(%correlation_key, "Lost save race, reloading");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(IngestError::ConflictRetriesExhausted(SAVE_RETRIES).into())
    }
}
