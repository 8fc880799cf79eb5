pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod ingest;
pub mod ledger;
pub mod queue;
pub mod reconciliation;
pub mod recording;
pub mod server;
