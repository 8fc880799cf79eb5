use axum::{extract::State, http::StatusCode, Json};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::api::models::WebhookAcceptedResponse;
use crate::api::AppState;
use crate::error::AppResult;
use crate::queue::{Task, TaskKind};

/// Accept a webhook and return 202 immediately. The response must never
/// block on external-API latency, so all processing goes through the queue.
async fn accept(
    state: &AppState,
    kind: TaskKind,
) -> AppResult<(StatusCode, Json<WebhookAcceptedResponse>)> {
    let webhook_id = Uuid::new_v4().to_string();
    let queue_name = kind.queue_name();

    state.queue.enqueue(Task::new(kind)).await?;
    info!(webhook_id = %webhook_id, queue = queue_name, "Webhook accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookAcceptedResponse::new(webhook_id)),
    ))
}

/// Payment-processor transaction events (source A)
pub async fn processor_webhook(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> AppResult<(StatusCode, Json<WebhookAcceptedResponse>)> {
    accept(&state, TaskKind::ProcessorEvent(payload)).await
}

/// Card enrichment sub-webhook
pub async fn card_details_webhook(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> AppResult<(StatusCode, Json<WebhookAcceptedResponse>)> {
    accept(&state, TaskKind::CardDetails(payload)).await
}

/// Order-system external-id updates (source B)
pub async fn order_webhook(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> AppResult<(StatusCode, Json<WebhookAcceptedResponse>)> {
    accept(&state, TaskKind::OrderEvent(payload)).await
}
