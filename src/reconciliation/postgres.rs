use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::reconciliation::record::{
    CardDetails, LifecycleStatus, PaymentRecord, SubPayment, VerificationStatus,
};
use crate::reconciliation::store::ReconciliationStore;

const COLUMNS: &str = "id, correlation_key, invoice_reference, ledger_order_id, \
     processor_transaction_id, verification_status, sub_payments, order_reference, \
     client_token, card_details, processor_payload, order_payload, lifecycle_status, \
     recording_attempts, last_error, matched_at, recorded_at, version, created_at, updated_at";

/// Postgres-backed record store. Semi-structured fields (sub-payments, card
/// details, raw payloads) live in JSONB columns; the unique index on
/// `correlation_key` enforces the find-or-create invariant and the `version`
/// column carries the optimistic-concurrency check.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct PaymentRecordRow {
    id: Uuid,
    correlation_key: String,
    invoice_reference: String,
    ledger_order_id: Option<String>,
    processor_transaction_id: Option<String>,
    verification_status: Option<String>,
    sub_payments: Value,
    order_reference: Option<String>,
    client_token: Option<String>,
    card_details: Option<Value>,
    processor_payload: Option<Value>,
    order_payload: Option<Value>,
    lifecycle_status: String,
    recording_attempts: i32,
    last_error: Option<String>,
    matched_at: Option<DateTime<Utc>>,
    recorded_at: Option<DateTime<Utc>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRecordRow> for PaymentRecord {
    type Error = AppError;

    fn try_from(row: PaymentRecordRow) -> AppResult<Self> {
        let sub_payments: Vec<SubPayment> = serde_json::from_value(row.sub_payments)?;
        let card_details: Option<CardDetails> = match row.card_details {
            Some(value) => Some(serde_json::from_value(value)?),
            None => None,
        };
        let verification_status = match row.verification_status.as_deref() {
            Some(raw) => Some(VerificationStatus::parse(raw).ok_or_else(|| {
                AppError::Internal(format!("unknown verification status in store: {}", raw))
            })?),
            None => None,
        };
        let lifecycle_status = LifecycleStatus::parse(&row.lifecycle_status).ok_or_else(|| {
            AppError::Internal(format!(
                "unknown lifecycle status in store: {}",
                row.lifecycle_status
            ))
        })?;

        Ok(PaymentRecord {
            id: row.id,
            correlation_key: row.correlation_key,
            invoice_reference: row.invoice_reference,
            ledger_order_id: row.ledger_order_id,
            processor_transaction_id: row.processor_transaction_id,
            verification_status,
            sub_payments,
            order_reference: row.order_reference,
            client_token: row.client_token,
            card_details,
            processor_payload: row.processor_payload,
            order_payload: row.order_payload,
            lifecycle_status,
            recording_attempts: row.recording_attempts,
            last_error: row.last_error,
            matched_at: row.matched_at,
            recorded_at: row.recorded_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl PgStore {
    async fn fetch_one_where(
        &self,
        predicate: &str,
        bind: &str,
    ) -> AppResult<Option<PaymentRecord>> {
        let query = format!(
            "SELECT {} FROM payment_records WHERE {} LIMIT 1",
            COLUMNS, predicate
        );
        let row = sqlx::query_as::<_, PaymentRecordRow>(&query)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await?;
        row.map(PaymentRecord::try_from).transpose()
    }
}

#[async_trait]
impl ReconciliationStore for PgStore {
    async fn find_or_create(
        &self,
        correlation_key: &str,
        invoice_reference: &str,
    ) -> AppResult<PaymentRecord> {
        // ON CONFLICT DO NOTHING keeps concurrent creation from both sources
        // down to a single row; the reselect picks up whichever insert won.
        sqlx::query(
            r#"
            INSERT INTO payment_records (id, correlation_key, invoice_reference, lifecycle_status)
            VALUES ($1, $2, $3, 'pending')
            ON CONFLICT (correlation_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(correlation_key)
        .bind(invoice_reference)
        .execute(&self.pool)
        .await?;

        self.find(correlation_key).await?.ok_or_else(|| {
            AppError::Internal(format!(
                "payment record for {} missing after find-or-create",
                correlation_key
            ))
        })
    }

    async fn find(&self, correlation_key: &str) -> AppResult<Option<PaymentRecord>> {
        self.fetch_one_where("correlation_key = $1", correlation_key)
            .await
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<PaymentRecord>> {
        let query = format!("SELECT {} FROM payment_records WHERE id = $1", COLUMNS);
        let row = sqlx::query_as::<_, PaymentRecordRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(PaymentRecord::try_from).transpose()
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> AppResult<Option<PaymentRecord>> {
        self.fetch_one_where("processor_transaction_id = $1", transaction_id)
            .await
    }

    async fn find_by_sub_payment_id(
        &self,
        sub_payment_id: &str,
    ) -> AppResult<Option<PaymentRecord>> {
        let query = format!(
            "SELECT {} FROM payment_records WHERE sub_payments @> $1::jsonb LIMIT 1",
            COLUMNS
        );
        let containment = serde_json::json!([{ "id": sub_payment_id }]);
        let row = sqlx::query_as::<_, PaymentRecordRow>(&query)
            .bind(containment)
            .fetch_optional(&self.pool)
            .await?;
        row.map(PaymentRecord::try_from).transpose()
    }

    async fn list_stale(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<PaymentRecord>> {
        let query = format!(
            "SELECT {} FROM payment_records \
             WHERE lifecycle_status = 'pending' AND created_at < $1 \
             ORDER BY created_at",
            COLUMNS
        );
        let rows = sqlx::query_as::<_, PaymentRecordRow>(&query)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(PaymentRecord::try_from).collect()
    }

    async fn save(&self, record: &mut PaymentRecord) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE payment_records SET
                invoice_reference = $3,
                ledger_order_id = $4,
                processor_transaction_id = $5,
                verification_status = $6,
                sub_payments = $7,
                order_reference = $8,
                client_token = $9,
                card_details = $10,
                processor_payload = $11,
                order_payload = $12,
                lifecycle_status = $13,
                recording_attempts = $14,
                last_error = $15,
                matched_at = $16,
                recorded_at = $17,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(record.id)
        .bind(record.version)
        .bind(&record.invoice_reference)
        .bind(&record.ledger_order_id)
        .bind(&record.processor_transaction_id)
        .bind(record.verification_status.map(|vs| vs.as_str()))
        .bind(serde_json::to_value(&record.sub_payments)?)
        .bind(&record.order_reference)
        .bind(&record.client_token)
        .bind(
            record
                .card_details
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(&record.processor_payload)
        .bind(&record.order_payload)
        .bind(record.lifecycle_status.as_str())
        .bind(record.recording_attempts)
        .bind(&record.last_error)
        .bind(record.matched_at)
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "payment record {} changed since version {}",
                record.id, record.version
            )));
        }

        record.version += 1;
        record.updated_at = Utc::now();
        Ok(())
    }
}
