use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Literal prefix of the structured invoice reference carried by the payment
/// processor. The correlation key is everything after the colon.
pub const INVOICE_REFERENCE_PREFIX: &str = "NULF-CT";

/// Business-level attempt ceiling for the recording pipeline.
pub const MAX_RECORDING_ATTEMPTS: i32 = 5;

/// Records still pending past this age get flagged by the stale sweeper.
pub const STALE_AFTER_HOURS: i64 = 48;

/// Lifecycle of a payment record across both webhook sources and the
/// recording pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    /// Waiting for the other source, or for KYC approval
    Pending,
    /// Both sources received and KYC approved, ready to record
    Matched,
    /// Recording to the ledger is in flight
    Recording,
    /// Successfully recorded in the ledger
    Recorded,
    /// Recording failed after max attempts, needs manual intervention
    Failed,
    /// KYC outcome is still under review
    KycPending,
    /// KYC declined, recording must never proceed
    KycDeclined,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Pending => "pending",
            LifecycleStatus::Matched => "matched",
            LifecycleStatus::Recording => "recording",
            LifecycleStatus::Recorded => "recorded",
            LifecycleStatus::Failed => "failed",
            LifecycleStatus::KycPending => "kyc_pending",
            LifecycleStatus::KycDeclined => "kyc_declined",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(LifecycleStatus::Pending),
            "matched" => Some(LifecycleStatus::Matched),
            "recording" => Some(LifecycleStatus::Recording),
            "recorded" => Some(LifecycleStatus::Recorded),
            "failed" => Some(LifecycleStatus::Failed),
            "kyc_pending" => Some(LifecycleStatus::KycPending),
            "kyc_declined" => Some(LifecycleStatus::KycDeclined),
            _ => None,
        }
    }

    /// States owned by the recording pipeline. Ingestion must never move a
    /// record out of these.
    pub fn is_recording_phase(&self) -> bool {
        matches!(
            self,
            LifecycleStatus::Recording | LifecycleStatus::Recorded | LifecycleStatus::Failed
        )
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity/KYC verification outcome reported by the payment processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Approved,
    Review,
    Declined,
}

impl VerificationStatus {
    /// Wire values as the processor sends them.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "APPROVE" => Some(VerificationStatus::Approved),
            "REVIEW" => Some(VerificationStatus::Review),
            "DECLINE" => Some(VerificationStatus::Declined),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Approved => "APPROVE",
            VerificationStatus::Review => "REVIEW",
            VerificationStatus::Declined => "DECLINE",
        }
    }
}

/// One payment instrument within a checkout. A single checkout may settle
/// through several of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubPayment {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub status: String,
}

impl SubPayment {
    /// Declined entries are terminal at the processor and never recorded.
    pub fn is_declined(&self) -> bool {
        self.status == "Declined"
    }
}

/// Card enrichment data delivered by a separate processor sub-webhook.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_month: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_instrument_uuid: Option<String>,
}

/// The durable reconciliation record, one per checkout. Merges the partial
/// views of both webhook sources under a single correlation key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub correlation_key: String,
    pub invoice_reference: String,
    pub ledger_order_id: Option<String>,
    pub processor_transaction_id: Option<String>,
    pub verification_status: Option<VerificationStatus>,
    pub sub_payments: Vec<SubPayment>,
    pub order_reference: Option<String>,
    pub client_token: Option<String>,
    pub card_details: Option<CardDetails>,
    /// Raw source payloads, kept for audit only
    pub processor_payload: Option<Value>,
    pub order_payload: Option<Value>,
    /// Derived cache of the lifecycle, never set directly by ingestion
    pub lifecycle_status: LifecycleStatus,
    pub recording_attempts: i32,
    pub last_error: Option<String>,
    pub matched_at: Option<DateTime<Utc>>,
    pub recorded_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped on every save
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Format the structured invoice reference for a correlation key.
pub fn format_invoice_reference(correlation_key: &str) -> String {
    format!("{}:{}", INVOICE_REFERENCE_PREFIX, correlation_key)
}

/// Extract the correlation key from an invoice reference. The remainder is
/// opaque and may itself contain hyphens or colons.
pub fn extract_correlation_key(invoice_reference: &str) -> Option<&str> {
    let rest = invoice_reference.strip_prefix(INVOICE_REFERENCE_PREFIX)?;
    let key = rest.strip_prefix(':')?;
    if key.is_empty() {
        return None;
    }
    Some(key)
}

impl PaymentRecord {
    /// Fresh placeholder record, created by whichever source arrives first.
    pub fn new(correlation_key: &str, invoice_reference: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            correlation_key: correlation_key.to_string(),
            invoice_reference: invoice_reference.to_string(),
            ledger_order_id: None,
            processor_transaction_id: None,
            verification_status: None,
            sub_payments: Vec::new(),
            order_reference: None,
            client_token: None,
            card_details: None,
            processor_payload: None,
            order_payload: None,
            lifecycle_status: LifecycleStatus::Pending,
            recording_attempts: 0,
            last_error: None,
            matched_at: None,
            recorded_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derive the correct lifecycle status from the current fields.
    ///
    /// Pure and order-independent: feeding the two sources in either order,
    /// or twice each, lands on the same status. Precedence top to bottom,
    /// first match wins.
    pub fn derive_status(&self) -> LifecycleStatus {
        match self.verification_status {
            Some(VerificationStatus::Declined) => return LifecycleStatus::KycDeclined,
            Some(VerificationStatus::Review) => return LifecycleStatus::KycPending,
            _ => {}
        }

        if !self.sub_payments.is_empty()
            && self.ledger_order_id.is_some()
            && self.verification_status == Some(VerificationStatus::Approved)
        {
            LifecycleStatus::Matched
        } else {
            LifecycleStatus::Pending
        }
    }

    /// Re-derive and apply the lifecycle status after an ingestion mutation.
    ///
    /// Stamps `matched_at` the first time the record enters `matched` and
    /// never overwrites it. States owned by the recording pipeline are left
    /// alone so duplicate webhook delivery cannot regress a recorded record.
    pub fn apply_derived_status(&mut self, now: DateTime<Utc>) {
        if self.lifecycle_status.is_recording_phase() {
            return;
        }

        let derived = self.derive_status();
        if derived == LifecycleStatus::Matched && self.matched_at.is_none() {
            self.matched_at = Some(now);
        }
        self.lifecycle_status = derived;
    }

    /// Sub-payments eligible for ledger recording.
    pub fn recordable_sub_payments(&self) -> Vec<&SubPayment> {
        self.sub_payments
            .iter()
            .filter(|sp| !sp.is_declined())
            .collect()
    }

    pub fn max_attempts_reached(&self) -> bool {
        self.recording_attempts >= MAX_RECORDING_ATTEMPTS
    }
}
