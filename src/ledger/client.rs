use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::ledger::models::{LedgerPaymentRequest, LedgerResponse};

pub const LEDGER_PAYMENT_PATH: &str = "/api/Personal/Order/Payment/CreditCard/Save";

/// Every ledger call is bounded by this timeout; on expiry the call is a
/// failed item, never a hang.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Ledger API seam. The orchestrator talks to this trait so tests can
/// substitute a capturing implementation.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Submit one payment posting. `Err` covers transport problems and
    /// non-2xx responses; an application-level rejection comes back as
    /// `Ok` with `IsSuccessful = false`.
    async fn submit_payment(&self, request: &LedgerPaymentRequest) -> AppResult<LedgerResponse>;
}

/// HTTP client for the back-office ledger.
pub struct HttpLedgerClient {
    client: Client,
    base_url: String,
}

impl HttpLedgerClient {
    pub fn new(base_url: &str, username: &str, password: &str) -> AppResult<Self> {
        let authorization = format!(
            "Basic {}",
            BASE64.encode(format!("{}:{}", username, password))
        );
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&authorization)
                .map_err(|e| AppError::Config(format!("invalid ledger credentials: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build ledger client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LedgerApi for HttpLedgerClient {
    async fn submit_payment(&self, request: &LedgerPaymentRequest) -> AppResult<LedgerResponse> {
        let url = format!("{}{}", self.base_url, LEDGER_PAYMENT_PATH);
        debug!(
            order_id = request.order_id,
            transaction_id = %request.transaction_id,
            "Submitting payment to ledger"
        );

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(AppError::External(format!(
                "ledger returned HTTP {}",
                status
            )));
        }

        let body: LedgerResponse = response.json().await?;
        info!(
            order_id = request.order_id,
            transaction_id = %request.transaction_id,
            successful = body.is_successful(),
            "Ledger response received"
        );
        Ok(body)
    }
}
