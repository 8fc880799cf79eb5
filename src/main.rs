use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reconciler::{bootstrap, config::Config, server};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,reconciler=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("🚀 Starting Payment Reconciliation Service");

    dotenv::dotenv().ok();
    let config = Config::from_env();

    let state = bootstrap::initialize_app_state(&config).await?;

    let app = server::create_app(state).await;
    server::run_server(app, &config.bind_address).await?;

    Ok(())
}
