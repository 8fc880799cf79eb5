use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::reconciliation::record::{LifecycleStatus, PaymentRecord};
use crate::reconciliation::store::ReconciliationStore;

/// In-memory record store. Used by the test suite and for local runs
/// without a database; mirrors the optimistic-concurrency contract of the
/// Postgres store exactly.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, PaymentRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReconciliationStore for MemoryStore {
    async fn find_or_create(
        &self,
        correlation_key: &str,
        invoice_reference: &str,
    ) -> AppResult<PaymentRecord> {
        let mut records = self.records.write();
        if let Some(existing) = records
            .values()
            .find(|r| r.correlation_key == correlation_key)
        {
            return Ok(existing.clone());
        }

        let record = PaymentRecord::new(correlation_key, invoice_reference);
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find(&self, correlation_key: &str) -> AppResult<Option<PaymentRecord>> {
        let records = self.records.read();
        Ok(records
            .values()
            .find(|r| r.correlation_key == correlation_key)
            .cloned())
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<PaymentRecord>> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> AppResult<Option<PaymentRecord>> {
        let records = self.records.read();
        Ok(records
            .values()
            .find(|r| r.processor_transaction_id.as_deref() == Some(transaction_id))
            .cloned())
    }

    async fn find_by_sub_payment_id(
        &self,
        sub_payment_id: &str,
    ) -> AppResult<Option<PaymentRecord>> {
        let records = self.records.read();
        Ok(records
            .values()
            .find(|r| r.sub_payments.iter().any(|sp| sp.id == sub_payment_id))
            .cloned())
    }

    async fn list_stale(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<PaymentRecord>> {
        let records = self.records.read();
        Ok(records
            .values()
            .filter(|r| r.lifecycle_status == LifecycleStatus::Pending && r.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn save(&self, record: &mut PaymentRecord) -> AppResult<()> {
        let mut records = self.records.write();
        let stored = records
            .get(&record.id)
            .ok_or_else(|| AppError::NotFound(format!("payment record {}", record.id)))?;

        if stored.version != record.version {
            return Err(AppError::Conflict(format!(
                "payment record {} is at version {}, read at {}",
                record.id, stored.version, record.version
            )));
        }

        record.version += 1;
        record.updated_at = Utc::now();
        records.insert(record.id, record.clone());
        Ok(())
    }
}
