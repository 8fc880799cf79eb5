use axum::{
    routing::{get, post},
    Json, Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::api::{
    status::payment_status,
    webhooks::{card_details_webhook, order_webhook, processor_webhook},
    AppState,
};

pub async fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    Router::new()
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                // Webhook endpoints: acknowledge and enqueue, never process inline
                .route("/webhooks/processor", post(processor_webhook))
                .route("/webhooks/processor/card-details", post(card_details_webhook))
                .route("/webhooks/orders", post(order_webhook))
                // Operator status endpoint
                .route("/payments/:correlation_key", get(payment_status)),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(15))),
        )
        .with_state(state)
}

pub async fn run_server(app: Router, bind_address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Listening on {}", bind_address);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
