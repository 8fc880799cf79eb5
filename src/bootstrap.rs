use chrono::{Duration as ChronoDuration, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

use crate::{
    api::AppState,
    config::Config,
    error::AppResult,
    ledger::client::{HttpLedgerClient, LedgerApi},
    queue::{memory::InProcessQueue, worker, worker::Dispatcher, TaskQueue},
    reconciliation::{
        memory::MemoryStore, postgres::PgStore, store::ReconciliationStore, STALE_AFTER_HOURS,
    },
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let store: Arc<dyn ReconciliationStore> = match &config.database_url {
        Some(url) => {
            let pool = initialize_database(url).await?;
            Arc::new(PgStore::new(pool))
        }
        None => {
            warn!("⚠️  DATABASE_URL not set - using in-memory record store");
            Arc::new(MemoryStore::new())
        }
    };

    let ledger: Arc<dyn LedgerApi> = Arc::new(HttpLedgerClient::new(
        &config.ledger_api_url,
        &config.ledger_api_username,
        &config.ledger_api_password,
    )?);
    info!("✅ Ledger client initialized for {}", config.ledger_api_url);

    let (queue, rx) = InProcessQueue::new();
    let queue: Arc<dyn TaskQueue> = Arc::new(queue);

    let dispatcher = Arc::new(Dispatcher::new(store.clone(), queue.clone(), ledger));
    tokio::spawn(worker::run_worker(dispatcher, rx));
    info!("✅ Task worker started");

    start_stale_sweeper(store.clone());
    info!("✅ Stale record sweeper started (hourly)");

    Ok(AppState { store, queue })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(50)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await?;

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| crate::error::AppError::Internal(format!("migration failed: {}", e)))?;

    info!("✓ Database initialized");
    Ok(pool)
}

/// Hourly scan flagging records still pending past the stale threshold.
/// Observability only: the record store is the audit trail and nothing is
/// deleted or mutated.
fn start_stale_sweeper(store: Arc<dyn ReconciliationStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;

            let cutoff = Utc::now() - ChronoDuration::hours(STALE_AFTER_HOURS);
            match store.list_stale(cutoff).await {
                Ok(stale) => {
                    for record in stale {
                        warn!(
                            correlation_key = %record.correlation_key,
                            created_at = %record.created_at,
                            "Payment record still pending past stale threshold"
                        );
                    }
                }
                Err(e) => error!("Stale sweep failed: {:?}", e),
            }
        }
    });
}
