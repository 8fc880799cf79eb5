pub mod memory;
pub mod worker;

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::error::AppResult;

/// Redelivery ceiling for a single task. This bounds transient-error retry
/// only; the recording pipeline's business attempt counter is what decides
/// terminal failure.
pub const MAX_DELIVERIES: u32 = 8;

const BACKOFF_BASE_SECS: u64 = 2;
const BACKOFF_CAP_SECS: u64 = 300;

/// Work item carried by the task queue.
#[derive(Debug, Clone)]
pub enum TaskKind {
    /// Payment-processor transaction event (source A)
    ProcessorEvent(Value),
    /// Order-system external-id update (source B)
    OrderEvent(Value),
    /// Card enrichment sub-webhook
    CardDetails(Value),
    /// Record a matched payment to the ledger
    RecordPayment(Uuid),
}

impl TaskKind {
    /// Logical queue label, used in logs.
    pub fn queue_name(&self) -> &'static str {
        match self {
            TaskKind::ProcessorEvent(_) | TaskKind::CardDetails(_) => "processor_webhooks",
            TaskKind::OrderEvent(_) => "order_webhooks",
            TaskKind::RecordPayment(_) => "ledger_recordings",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub kind: TaskKind,
    /// Zero-based delivery attempt, bumped on each redelivery
    pub delivery: u32,
}

impl Task {
    pub fn new(kind: TaskKind) -> Self {
        Self { kind, delivery: 0 }
    }

    pub fn redelivery(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            delivery: self.delivery + 1,
        }
    }
}

/// Exponential backoff with jitter for task redelivery.
pub fn backoff_delay(delivery: u32) -> Duration {
    let exp = BACKOFF_BASE_SECS.saturating_mul(1u64 << delivery.min(16));
    let secs = exp.min(BACKOFF_CAP_SECS);
    let jitter_ms = rand::rng().random_range(0..1000);
    Duration::from_secs(secs) + Duration::from_millis(jitter_ms)
}

/// Durable-queue seam. Delivery is at-least-once: handlers must tolerate
/// duplicates, and an enqueue is fire-and-forget from the caller's view.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: Task) -> AppResult<()>;

    async fn enqueue_after(&self, task: Task, delay: Duration) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_grows_and_caps() {
        let first = backoff_delay(0);
        assert!(first >= Duration::from_secs(2));
        assert!(first < Duration::from_secs(4));

        let fourth = backoff_delay(3);
        assert!(fourth >= Duration::from_secs(16));

        // capped regardless of how high the delivery count gets
        let huge = backoff_delay(60);
        assert!(huge < Duration::from_secs(BACKOFF_CAP_SECS + 2));
    }

    #[test]
    fn test_redelivery_bumps_attempt() {
        let task = Task::new(TaskKind::RecordPayment(Uuid::new_v4()));
        assert_eq!(task.delivery, 0);
        assert_eq!(task.redelivery().delivery, 1);
    }
}
