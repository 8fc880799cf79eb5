use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payment posting as the back-office ledger API expects it. Optional
/// fields are omitted entirely when the source data is missing, never
/// filled with fabricated defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LedgerPaymentRequest {
    #[serde(rename = "OrderID")]
    pub order_id: i64,
    pub amount: Decimal,
    pub promissory_amount: Decimal,
    #[serde(rename = "PaymentStatusTypeID")]
    pub payment_status_type_id: i32,
    pub credit_card_account_id: i32,
    pub payment_description: String,
    pub payment_date: String,
    /// Line-level reference: the sub-payment's own id
    #[serde(rename = "TransactionID")]
    pub transaction_id: String,
    /// Order-level reference: the structured invoice reference
    pub reference_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_reference: Option<String>,
    /// Client/profile token used for persistent-token tracking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
    // card-only fields, absent for other payment kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_token: Option<String>,
    #[serde(rename = "Last4CCNumber", skip_serializing_if = "Option::is_none")]
    pub last4_cc_number: Option<String>,
    #[serde(rename = "ExpirationDateMMYY", skip_serializing_if = "Option::is_none")]
    pub expiration_date_mmyy: Option<String>,
}

/// Ledger API response envelope on HTTP 200.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerResponse {
    #[serde(rename = "Result")]
    pub result: Option<LedgerResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerResult {
    #[serde(rename = "IsSuccessful")]
    pub is_successful: bool,
    #[serde(rename = "Message")]
    pub message: Option<String>,
}

impl LedgerResponse {
    pub fn is_successful(&self) -> bool {
        self.result.as_ref().map(|r| r.is_successful).unwrap_or(false)
    }

    pub fn message(&self) -> String {
        self.result
            .as_ref()
            .and_then(|r| r.message.clone())
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_request_serializes_vendor_field_names() {
        let request = LedgerPaymentRequest {
            order_id: 1001,
            amount: dec!(25.50),
            promissory_amount: dec!(0),
            payment_status_type_id: 1,
            credit_card_account_id: 30,
            payment_description: "Wallet Transfer - sp-1".to_string(),
            payment_date: "2026-02-01T00:00:00+00:00".to_string(),
            transaction_id: "sp-1".to_string(),
            reference_number: "NULF-CT:cart-1".to_string(),
            order_reference: None,
            client_token: None,
            payment_token: None,
            last4_cc_number: None,
            expiration_date_mmyy: None,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["OrderID"], 1001);
        assert_eq!(value["PaymentStatusTypeID"], 1);
        assert_eq!(value["CreditCardAccountId"], 30);
        assert_eq!(value["ReferenceNumber"], "NULF-CT:cart-1");
        assert_eq!(value["TransactionID"], "sp-1");
        // absent optionals are omitted, not null
        assert!(value.get("Last4CCNumber").is_none());
        assert!(value.get("PaymentToken").is_none());
        assert!(value.get("OrderReference").is_none());
    }

    #[test]
    fn test_response_success_flag() {
        let body: LedgerResponse = serde_json::from_str(
            r#"{"Result": {"IsSuccessful": true, "Message": "ok"}}"#,
        )
        .unwrap();
        assert!(body.is_successful());

        let rejected: LedgerResponse = serde_json::from_str(
            r#"{"Result": {"IsSuccessful": false, "Message": "order not found"}}"#,
        )
        .unwrap();
        assert!(!rejected.is_successful());
        assert_eq!(rejected.message(), "order not found");

        let empty: LedgerResponse = serde_json::from_str("{}").unwrap();
        assert!(!empty.is_successful());
    }
}
