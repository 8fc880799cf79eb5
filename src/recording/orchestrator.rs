use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, RecordingError};
use crate::ingest::SAVE_RETRIES;
use crate::ledger::client::LedgerApi;
use crate::reconciliation::record::{LifecycleStatus, PaymentRecord};
use crate::reconciliation::store::ReconciliationStore;
use crate::recording::payload::{build_payment_request, BuiltPayload, RecordingContext};

/// Per-sub-payment outcome of one recording attempt.
#[derive(Debug, Clone)]
pub struct ItemResult {
    pub sub_payment_id: String,
    pub success: bool,
    pub skipped: bool,
    pub error: Option<String>,
}

/// Converts a matched record into ledger postings.
///
/// Idempotent by construction: every run re-validates the record is still
/// `matched` and claims it with an optimistic save, so duplicate delivery or
/// concurrent workers cannot double-record. The business attempt counter is
/// the sole authority for terminal escalation; queue-level redelivery is
/// purely a scheduling mechanism.
pub struct RecordingOrchestrator {
    store: Arc<dyn ReconciliationStore>,
    ledger: Arc<dyn LedgerApi>,
}

impl RecordingOrchestrator {
    pub fn new(store: Arc<dyn ReconciliationStore>, ledger: Arc<dyn LedgerApi>) -> Self {
        Self { store, ledger }
    }

    pub async fn run(&self, record_id: Uuid) -> AppResult<()> {
        let Some(mut record) = self.store.get(record_id).await? else {
            warn!(%record_id, "Payment record vanished before recording");
            return Ok(());
        };

        // the record may have moved on between enqueue and execution:
        // already recorded by a concurrent run, or KYC flipped to declined
        if record.lifecycle_status != LifecycleStatus::Matched {
            info!(
                correlation_key = %record.correlation_key,
                status = %record.lifecycle_status,
                "Record not matched, nothing to record"
            );
            return Ok(());
        }

        record.lifecycle_status = LifecycleStatus::Recording;
        match self.store.save(&mut record).await {
            Ok(()) => {}
            Err(AppError::Conflict(_)) => {
                // another worker claimed the record first
                info!(
                    correlation_key = %record.correlation_key,
                    "Lost the recording claim race"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let results = self.record_sub_payments(&record).await;

        let failures: Vec<&ItemResult> = results.iter().filter(|r| !r.success).collect();
        if failures.is_empty() {
            record.lifecycle_status = LifecycleStatus::Recorded;
            record.recorded_at = Some(Utc::now());
            record.last_error = None;
            self.save_outcome(&mut record).await?;
            info!(
                correlation_key = %record.correlation_key,
                postings = results.len(),
                "All payments recorded to ledger"
            );
            return Ok(());
        }

        let message = failures
            .iter()
            .map(|r| {
                format!(
                    "{}: {}",
                    r.sub_payment_id,
                    r.error.as_deref().unwrap_or("unknown error")
                )
            })
            .collect::<Vec<_>>()
            .join("; ");

        record.recording_attempts += 1;
        record.last_error = Some(message.clone());
        if record.max_attempts_reached() {
            record.lifecycle_status = LifecycleStatus::Failed;
            self.save_outcome(&mut record).await?;
            error!(
                correlation_key = %record.correlation_key,
                attempts = record.recording_attempts,
                "Recording failed terminally, needs manual intervention: {}",
                message
            );
            // terminal: the attempt counter has decided, no further retry
            Ok(())
        } else {
            record.lifecycle_status = LifecycleStatus::Matched;
            self.save_outcome(&mut record).await?;
            warn!(
                correlation_key = %record.correlation_key,
                attempts = record.recording_attempts,
                "Recording attempt failed, will retry: {}",
                message
            );
            Err(RecordingError::AttemptFailed {
                attempts: record.recording_attempts,
                message,
            }
            .into())
        }
    }

    async fn record_sub_payments(&self, record: &PaymentRecord) -> Vec<ItemResult> {
        let recordable = record.recordable_sub_payments();
        if recordable.is_empty() {
            // vacuous success: nothing recordable means the record is done
            info!(
                correlation_key = %record.correlation_key,
                "No recordable sub-payments"
            );
            return Vec::new();
        }

        let Some(ledger_order_id) = record
            .ledger_order_id
            .as_deref()
            .and_then(|raw| raw.parse::<i64>().ok())
        else {
            let message = format!(
                "ledger order id {:?} is not a valid order number",
                record.ledger_order_id
            );
            return recordable
                .iter()
                .map(|sp| ItemResult {
                    sub_payment_id: sp.id.clone(),
                    success: false,
                    skipped: false,
                    error: Some(message.clone()),
                })
                .collect();
        };

        let context = RecordingContext {
            invoice_reference: &record.invoice_reference,
            order_reference: record.order_reference.as_deref(),
            client_token: record.client_token.as_deref(),
        };
        let now = Utc::now();

        let submissions = recordable.iter().map(|sub_payment| {
            let built = build_payment_request(
                ledger_order_id,
                sub_payment,
                record.verification_status,
                record.card_details.as_ref(),
                &context,
                now,
            );
            async move {
                match built {
                    BuiltPayload::Skipped { reason } => {
                        info!(
                            sub_payment_id = %sub_payment.id,
                            "Skipping sub-payment: {}", reason
                        );
                        ItemResult {
                            sub_payment_id: sub_payment.id.clone(),
                            success: true,
                            skipped: true,
                            error: None,
                        }
                    }
                    BuiltPayload::Request(request) => {
                        match self.ledger.submit_payment(&request).await {
                            Ok(response) if response.is_successful() => ItemResult {
                                sub_payment_id: sub_payment.id.clone(),
                                success: true,
                                skipped: false,
                                error: None,
                            },
                            Ok(response) => ItemResult {
                                sub_payment_id: sub_payment.id.clone(),
                                success: false,
                                skipped: false,
                                error: Some(format!("ledger rejected: {}", response.message())),
                            },
                            Err(e) => ItemResult {
                                sub_payment_id: sub_payment.id.clone(),
                                success: false,
                                skipped: false,
                                error: Some(e.to_string()),
                            },
                        }
                    }
                }
            }
        });

        futures::future::join_all(submissions).await
    }

    /// Persist the attempt outcome. A concurrent duplicate webhook may have
    /// bumped the version while the ledger calls were in flight, so conflicts
    /// are recovered by reapplying the outcome onto a fresh copy.
    async fn save_outcome(&self, record: &mut PaymentRecord) -> AppResult<()> {
        for _ in 0..SAVE_RETRIES {
            match self.store.save(record).await {
                Ok(()) => return Ok(()),
                Err(AppError::Conflict(_)) => {
                    let fresh = self
                        .store
                        .get(record.id)
                        .await?
                        .ok_or(RecordingError::RecordMissing(record.id))?;
                    let mut updated = fresh;
                    updated.lifecycle_status = record.lifecycle_status;
                    updated.recording_attempts = record.recording_attempts;
                    updated.last_error = record.last_error.clone();
                    updated.recorded_at = record.recorded_at;
                    *record = updated;
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Conflict(format!(
            "could not persist recording outcome for {}",
            record.id
        )))
    }
}
