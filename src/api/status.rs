use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::models::PaymentStatusResponse;
use crate::api::AppState;
use crate::error::{AppError, AppResult};

/// Operator lookup of a record's reconciliation state. Terminal states
/// (`failed`, `kyc_declined`) surface here for manual intervention.
pub async fn payment_status(
    State(state): State<AppState>,
    Path(correlation_key): Path<String>,
) -> AppResult<Json<PaymentStatusResponse>> {
    let record = state
        .store
        .find(&correlation_key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("payment {}", correlation_key)))?;

    Ok(Json(record.into()))
}
