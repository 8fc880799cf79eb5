use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, IngestError};
use crate::ingest::{json_string, SAVE_RETRIES};
use crate::reconciliation::record::CardDetails;
use crate::reconciliation::store::ReconciliationStore;

/// Card enrichment sub-webhook. Fields arrive either flat or nested under a
/// `card` block depending on the processor's event revision.
#[derive(Debug, Clone, Deserialize)]
pub struct CardDetailsEvent {
    pub transaction_id: Option<String>,
    pub id: Option<String>,
    #[serde(alias = "card_number_last4")]
    pub last4: Option<String>,
    pub expiry_date: Option<String>,
    pub expiry_month: Option<Value>,
    pub expiry_year: Option<Value>,
    pub card_type: Option<String>,
    pub brand: Option<String>,
    pub payment_instrument_uuid: Option<String>,
    pub card: Option<CardBlock>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardBlock {
    pub last4: Option<String>,
    pub expiry_date: Option<String>,
    pub expiry_month: Option<Value>,
    pub expiry_year: Option<Value>,
    #[serde(rename = "type")]
    pub card_type: Option<String>,
    pub brand: Option<String>,
}

impl CardDetailsEvent {
    fn transaction_id(&self) -> Option<String> {
        self.transaction_id.clone().or_else(|| self.id.clone())
    }

    /// Flatten into the stored shape, preferring top-level fields over the
    /// nested card block.
    fn to_card_details(&self) -> CardDetails {
        let block = self.card.as_ref();
        CardDetails {
            last4: self
                .last4
                .clone()
                .or_else(|| block.and_then(|b| b.last4.clone())),
            expiry_date: self
                .expiry_date
                .clone()
                .or_else(|| block.and_then(|b| b.expiry_date.clone())),
            expiry_month: self
                .expiry_month
                .as_ref()
                .and_then(json_string)
                .or_else(|| block.and_then(|b| b.expiry_month.as_ref()).and_then(json_string)),
            expiry_year: self
                .expiry_year
                .as_ref()
                .and_then(json_string)
                .or_else(|| block.and_then(|b| b.expiry_year.as_ref()).and_then(json_string)),
            card_type: self
                .card_type
                .clone()
                .or_else(|| block.and_then(|b| b.card_type.clone())),
            brand: self
                .brand
                .clone()
                .or_else(|| block.and_then(|b| b.brand.clone())),
            payment_instrument_uuid: self.payment_instrument_uuid.clone(),
        }
    }
}

/// Merges card enrichment into an existing record. Never touches the
/// lifecycle status.
pub struct CardDetailsHandler {
    store: Arc<dyn ReconciliationStore>,
}

impl CardDetailsHandler {
    pub fn new(store: Arc<dyn ReconciliationStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, payload: &Value) -> AppResult<()> {
        let event: CardDetailsEvent = match serde_json::from_value(payload.clone()) {
            Ok(event) => event,
            Err(e) => {
                warn!("Discarding unparseable card details event: {}", e);
                return Ok(());
            }
        };

        let Some(transaction_id) = event.transaction_id() else {
            warn!("Discarding card details event without transaction id");
            return Ok(());
        };

        let details = event.to_card_details();

        for _ in 0..SAVE_RETRIES {
            // exact match on the processor transaction id, falling back to a
            // sub-payment id contained in an existing record
            let found = match self.store.find_by_transaction_id(&transaction_id).await? {
                Some(record) => Some(record),
                None => self.store.find_by_sub_payment_id(&transaction_id).await?,
            };
            let Some(mut record) = found else {
                warn!(
                    %transaction_id,
                    "No payment record found for card details event"
                );
                return Ok(());
            };

            record.card_details = Some(details.clone());

            match self.store.save(&mut record).await {
                Ok(()) => {
                    info!(
                        correlation_key = %record.correlation_key,
                        "Card details merged"
                    );
                    return Ok(());
                }
                Err(AppError::Conflict(_)) => {
                    debug!(%transaction_id, "Lost save race, reloading");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(IngestError::ConflictRetriesExhausted(SAVE_RETRIES).into())
    }
}
