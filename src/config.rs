use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub bind_address: String,
    /// When unset the service runs on the in-memory record store.
    pub database_url: Option<String>,
    pub ledger_api_url: String,
    pub ledger_api_username: String,
    pub ledger_api_password: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            ledger_api_url: std::env::var("LEDGER_API_URL")
                .unwrap_or_else(|_| "http://localhost:9090".to_string()),
            ledger_api_username: std::env::var("LEDGER_API_USERNAME").unwrap_or_default(),
            ledger_api_password: std::env::var("LEDGER_API_PASSWORD").unwrap_or_default(),
        }
    }
}
