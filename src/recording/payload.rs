use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;

use crate::ledger::models::LedgerPaymentRequest;
use crate::reconciliation::record::{CardDetails, SubPayment, VerificationStatus};

/// Processor payment kinds on the wire.
pub const CARD_KIND: &str = "LOAD_FUNDS_VIA_CARD";
pub const CASH_KIND: &str = "LOAD_FUNDS_VIA_CASH";
pub const WALLET_TRANSFER_KIND: &str = "UWALLET_TRANSFER";
pub const WALLET_KIND: &str = "uwallet";

/// All processor payments post against the same ledger card account.
pub const LEDGER_CARD_ACCOUNT_ID: i32 = 30;

/// Effective posting status after verification and kind overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveStatus {
    Settled,
    Pending,
    Declined,
}

impl EffectiveStatus {
    /// Ledger `PaymentStatusTypeID` values.
    pub fn type_id(self) -> i32 {
        match self {
            EffectiveStatus::Settled => 1,
            EffectiveStatus::Pending => 6,
            EffectiveStatus::Declined => 18,
        }
    }
}

/// Record-level fields the builder copies into ledger identifiers.
#[derive(Debug, Clone, Copy)]
pub struct RecordingContext<'a> {
    pub invoice_reference: &'a str,
    pub order_reference: Option<&'a str>,
    pub client_token: Option<&'a str>,
}

/// Outcome of building one sub-payment. Declined entries are filtered
/// upstream, but one that arrives anyway is reported as a skip rather than
/// submitted.
#[derive(Debug, Clone, PartialEq)]
pub enum BuiltPayload {
    Request(LedgerPaymentRequest),
    Skipped { reason: &'static str },
}

/// Effective status precedence, strongest first: verification override,
/// then the cash-kind always-pending rule, then the sub-payment's own
/// reported status, then a safe pending default for unrecognized values.
fn effective_status(
    sub_payment: &SubPayment,
    verification_status: Option<VerificationStatus>,
) -> EffectiveStatus {
    match verification_status {
        Some(VerificationStatus::Review) => return EffectiveStatus::Pending,
        Some(VerificationStatus::Declined) => return EffectiveStatus::Declined,
        _ => {}
    }

    if sub_payment.kind == CASH_KIND {
        return EffectiveStatus::Pending;
    }

    match sub_payment.status.as_str() {
        "Success" => EffectiveStatus::Settled,
        "Pending" => EffectiveStatus::Pending,
        "Declined" | "Failed" => EffectiveStatus::Declined,
        _ => EffectiveStatus::Pending,
    }
}

fn kind_description(kind: &str) -> &'static str {
    match kind {
        CARD_KIND => "Card Payment",
        WALLET_TRANSFER_KIND => "Wallet Transfer",
        WALLET_KIND => "Wallet",
        CASH_KIND => "Cash Payment",
        _ => "Wallet Transfer",
    }
}

/// Encode a card expiry as 4 digits MMYY, from either a combined `M/YYYY`
/// string or separate month/year fields. Missing or unusable data yields
/// `None`, never a placeholder.
pub fn encode_expiry(card_details: &CardDetails) -> Option<String> {
    if let Some(raw) = card_details.expiry_date.as_deref() {
        let mut parts = raw.splitn(2, '/');
        if let (Some(month), Some(year)) = (parts.next(), parts.next()) {
            if let Some(encoded) = encode_mmyy(month, year) {
                return Some(encoded);
            }
        }
    }

    encode_mmyy(
        card_details.expiry_month.as_deref()?,
        card_details.expiry_year.as_deref()?,
    )
}

/// Enrichment strings arrive straight off the wire; anything other than
/// plain ASCII digits is unusable.
fn encode_mmyy(month: &str, year: &str) -> Option<String> {
    if !is_digits(month) || !is_digits(year) {
        return None;
    }
    let yy = &year[year.len().saturating_sub(2)..];
    Some(format!("{:0>2}{}", month, yy))
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Translate one sub-payment into a ledger posting. Pure: everything the
/// mapping needs comes in as arguments.
pub fn build_payment_request(
    ledger_order_id: i64,
    sub_payment: &SubPayment,
    verification_status: Option<VerificationStatus>,
    card_details: Option<&CardDetails>,
    context: &RecordingContext<'_>,
    now: DateTime<Utc>,
) -> BuiltPayload {
    if sub_payment.is_declined() {
        return BuiltPayload::Skipped {
            reason: "declined at processor",
        };
    }

    let status = effective_status(sub_payment, verification_status);

    // pending postings carry the full amount as promissory only
    let (amount, promissory_amount) = if status == EffectiveStatus::Pending {
        (Decimal::ZERO, sub_payment.amount)
    } else {
        (sub_payment.amount, Decimal::ZERO)
    };

    let mut request = LedgerPaymentRequest {
        order_id: ledger_order_id,
        amount,
        promissory_amount,
        payment_status_type_id: status.type_id(),
        credit_card_account_id: LEDGER_CARD_ACCOUNT_ID,
        payment_description: format!("{} - {}", kind_description(&sub_payment.kind), sub_payment.id),
        payment_date: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        transaction_id: sub_payment.id.clone(),
        reference_number: context.invoice_reference.to_string(),
        order_reference: context.order_reference.map(str::to_string),
        client_token: context.client_token.map(str::to_string),
        payment_token: None,
        last4_cc_number: None,
        expiration_date_mmyy: None,
    };

    if sub_payment.kind == CARD_KIND {
        if let Some(card) = card_details {
            request.payment_token = card.payment_instrument_uuid.clone();
            request.last4_cc_number = card.last4.clone();
            request.expiration_date_mmyy = encode_expiry(card);
        }
    }

    BuiltPayload::Request(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sub_payment(kind: &str, status: &str) -> SubPayment {
        SubPayment {
            id: "sp-1".to_string(),
            kind: kind.to_string(),
            amount: dec!(120.00),
            currency: Some("USD".to_string()),
            status: status.to_string(),
        }
    }

    fn context() -> RecordingContext<'static> {
        RecordingContext {
            invoice_reference: "NULF-CT:cart-1",
            order_reference: Some("ord-ref-1"),
            client_token: Some("client-1"),
        }
    }

    fn build(
        sub: &SubPayment,
        verification: Option<VerificationStatus>,
        card: Option<&CardDetails>,
    ) -> LedgerPaymentRequest {
        match build_payment_request(1001, sub, verification, card, &context(), Utc::now()) {
            BuiltPayload::Request(request) => request,
            BuiltPayload::Skipped { reason } => panic!("unexpected skip: {}", reason),
        }
    }

    #[test]
    fn test_settled_payment_carries_full_amount() {
        let request = build(
            &sub_payment(WALLET_TRANSFER_KIND, "Success"),
            Some(VerificationStatus::Approved),
            None,
        );
        assert_eq!(request.payment_status_type_id, 1);
        assert_eq!(request.amount, dec!(120.00));
        assert_eq!(request.promissory_amount, dec!(0));
        assert_eq!(request.credit_card_account_id, 30);
        assert_eq!(request.reference_number, "NULF-CT:cart-1");
        assert_eq!(request.transaction_id, "sp-1");
        assert_eq!(request.order_reference.as_deref(), Some("ord-ref-1"));
        assert_eq!(request.client_token.as_deref(), Some("client-1"));
    }

    #[test]
    fn test_kyc_review_overrides_success_status() {
        // verification override beats the sub-payment's own status,
        // regardless of payment kind
        for kind in [WALLET_TRANSFER_KIND, CARD_KIND, CASH_KIND] {
            let request = build(
                &sub_payment(kind, "Success"),
                Some(VerificationStatus::Review),
                None,
            );
            assert_eq!(request.payment_status_type_id, 6);
            assert_eq!(request.amount, dec!(0));
            assert_eq!(request.promissory_amount, dec!(120.00));
        }
    }

    #[test]
    fn test_kyc_decline_overrides_to_declined() {
        let request = build(
            &sub_payment(WALLET_TRANSFER_KIND, "Success"),
            Some(VerificationStatus::Declined),
            None,
        );
        assert_eq!(request.payment_status_type_id, 18);
        // declined is not pending, so no promissory split
        assert_eq!(request.amount, dec!(120.00));
        assert_eq!(request.promissory_amount, dec!(0));
    }

    #[test]
    fn test_cash_kind_is_always_pending() {
        let request = build(
            &sub_payment(CASH_KIND, "Success"),
            Some(VerificationStatus::Approved),
            None,
        );
        assert_eq!(request.payment_status_type_id, 6);
        assert_eq!(request.amount, dec!(0));
        assert_eq!(request.promissory_amount, dec!(120.00));
    }

    #[test]
    fn test_unrecognized_status_defaults_to_pending() {
        let request = build(
            &sub_payment(WALLET_TRANSFER_KIND, "Bogus"),
            Some(VerificationStatus::Approved),
            None,
        );
        assert_eq!(request.payment_status_type_id, 6);
    }

    #[test]
    fn test_declined_sub_payment_is_skipped() {
        let built = build_payment_request(
            1001,
            &sub_payment(WALLET_TRANSFER_KIND, "Declined"),
            Some(VerificationStatus::Approved),
            None,
            &context(),
            Utc::now(),
        );
        assert!(matches!(built, BuiltPayload::Skipped { .. }));
    }

    #[test]
    fn test_card_fields_only_for_card_kind() {
        let card = CardDetails {
            last4: Some("4242".to_string()),
            expiry_date: Some("8/2029".to_string()),
            payment_instrument_uuid: Some("pi-1".to_string()),
            ..Default::default()
        };

        let request = build(
            &sub_payment(CARD_KIND, "Success"),
            Some(VerificationStatus::Approved),
            Some(&card),
        );
        assert_eq!(request.payment_token.as_deref(), Some("pi-1"));
        assert_eq!(request.last4_cc_number.as_deref(), Some("4242"));
        assert_eq!(request.expiration_date_mmyy.as_deref(), Some("0829"));

        let wallet = build(
            &sub_payment(WALLET_TRANSFER_KIND, "Success"),
            Some(VerificationStatus::Approved),
            Some(&card),
        );
        assert!(wallet.payment_token.is_none());
        assert!(wallet.last4_cc_number.is_none());
        assert!(wallet.expiration_date_mmyy.is_none());
    }

    #[test]
    fn test_card_kind_without_enrichment_leaves_fields_absent() {
        let request = build(
            &sub_payment(CARD_KIND, "Success"),
            Some(VerificationStatus::Approved),
            None,
        );
        assert!(request.payment_token.is_none());
        assert!(request.last4_cc_number.is_none());
        assert!(request.expiration_date_mmyy.is_none());
    }

    #[test]
    fn test_encode_expiry_from_combined_date() {
        let card = CardDetails {
            expiry_date: Some("8/2029".to_string()),
            ..Default::default()
        };
        assert_eq!(encode_expiry(&card).as_deref(), Some("0829"));

        let two_digit_year = CardDetails {
            expiry_date: Some("08/29".to_string()),
            ..Default::default()
        };
        assert_eq!(encode_expiry(&two_digit_year).as_deref(), Some("0829"));
    }

    #[test]
    fn test_encode_expiry_from_split_fields() {
        let card = CardDetails {
            expiry_month: Some("3".to_string()),
            expiry_year: Some("2028".to_string()),
            ..Default::default()
        };
        assert_eq!(encode_expiry(&card).as_deref(), Some("0328"));
    }

    #[test]
    fn test_encode_expiry_missing_data_is_none() {
        assert_eq!(encode_expiry(&CardDetails::default()), None);

        let month_only = CardDetails {
            expiry_month: Some("3".to_string()),
            ..Default::default()
        };
        assert_eq!(encode_expiry(&month_only), None);
    }

    #[test]
    fn test_encode_expiry_rejects_non_digit_data() {
        // multi-byte input must not panic the worker task
        let multibyte_year = CardDetails {
            expiry_month: Some("3".to_string()),
            expiry_year: Some("20é9".to_string()),
            ..Default::default()
        };
        assert_eq!(encode_expiry(&multibyte_year), None);

        let garbled_date = CardDetails {
            expiry_date: Some("8/20x9".to_string()),
            ..Default::default()
        };
        assert_eq!(encode_expiry(&garbled_date), None);

        let non_digit_month = CardDetails {
            expiry_month: Some("MAR".to_string()),
            expiry_year: Some("2028".to_string()),
            ..Default::default()
        };
        assert_eq!(encode_expiry(&non_digit_month), None);
    }
}
