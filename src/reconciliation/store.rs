use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::reconciliation::record::PaymentRecord;

/// Durable store for reconciliation records.
///
/// `find_or_create` and the optimistic `save` are the only synchronization
/// primitives in the system: ingestion handlers may run concurrently on
/// different workers for the same correlation key and must converge on a
/// single record without in-process locks.
#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Atomic lookup-or-create keyed by the correlation key. When the record
    /// already exists it is returned unmodified; concurrent creation from
    /// both sources must not produce duplicates.
    async fn find_or_create(
        &self,
        correlation_key: &str,
        invoice_reference: &str,
    ) -> AppResult<PaymentRecord>;

    async fn find(&self, correlation_key: &str) -> AppResult<Option<PaymentRecord>>;

    async fn get(&self, id: Uuid) -> AppResult<Option<PaymentRecord>>;

    /// Lookup by the processor's transaction id (card enrichment path).
    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> AppResult<Option<PaymentRecord>>;

    /// Fallback lookup by a sub-payment id contained in the record.
    async fn find_by_sub_payment_id(
        &self,
        sub_payment_id: &str,
    ) -> AppResult<Option<PaymentRecord>>;

    /// Records still pending that were created before the cutoff.
    async fn list_stale(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<PaymentRecord>>;

    /// Optimistic save. Fails with `AppError::Conflict` when the stored
    /// record changed since this copy was read; bumps the version on
    /// success. Callers recover by reload-reapply-retry.
    async fn save(&self, record: &mut PaymentRecord) -> AppResult<()>;
}
