pub mod client;
pub mod models;

pub use client::{HttpLedgerClient, LedgerApi};
pub use models::{LedgerPaymentRequest, LedgerResponse};
