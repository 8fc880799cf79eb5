use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::AppResult;
use crate::ingest::{CardDetailsHandler, OrderEventHandler, ProcessorEventHandler};
use crate::ledger::client::LedgerApi;
use crate::queue::{backoff_delay, Task, TaskKind, TaskQueue, MAX_DELIVERIES};
use crate::reconciliation::store::ReconciliationStore;
use crate::recording::orchestrator::RecordingOrchestrator;

/// Routes dequeued tasks to their handlers and schedules backoff
/// redelivery on failure.
pub struct Dispatcher {
    processor: ProcessorEventHandler,
    orders: OrderEventHandler,
    card_details: CardDetailsHandler,
    recorder: RecordingOrchestrator,
    queue: Arc<dyn TaskQueue>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn ReconciliationStore>,
        queue: Arc<dyn TaskQueue>,
        ledger: Arc<dyn LedgerApi>,
    ) -> Self {
        Self {
            processor: ProcessorEventHandler::new(store.clone(), queue.clone()),
            orders: OrderEventHandler::new(store.clone(), queue.clone()),
            card_details: CardDetailsHandler::new(store.clone()),
            recorder: RecordingOrchestrator::new(store, ledger),
            queue,
        }
    }

    pub async fn dispatch(&self, task: Task) {
        let queue_name = task.kind.queue_name();
        let result = self.execute(&task).await;

        if let Err(e) = result {
            if task.delivery + 1 >= MAX_DELIVERIES {
                error!(
                    queue = queue_name,
                    deliveries = task.delivery + 1,
                    "Dropping task after exhausting redeliveries: {}",
                    e
                );
                return;
            }

            let delay = backoff_delay(task.delivery);
            warn!(
                queue = queue_name,
                delivery = task.delivery,
                "Task failed, redelivering in {:?}: {}",
                delay,
                e
            );
            if let Err(enqueue_err) = self.queue.enqueue_after(task.redelivery(), delay).await {
                error!(queue = queue_name, "Failed to schedule redelivery: {}", enqueue_err);
            }
        }
    }

    async fn execute(&self, task: &Task) -> AppResult<()> {
        match &task.kind {
            TaskKind::ProcessorEvent(payload) => self.processor.handle(payload).await,
            TaskKind::OrderEvent(payload) => self.orders.handle(payload).await,
            TaskKind::CardDetails(payload) => self.card_details.handle(payload).await,
            TaskKind::RecordPayment(record_id) => self.recorder.run(*record_id).await,
        }
    }
}

/// Drain the queue, running each task on its own tokio task so handlers for
/// different records proceed concurrently.
pub async fn run_worker(dispatcher: Arc<Dispatcher>, mut rx: mpsc::UnboundedReceiver<Task>) {
    info!("Task worker started");
    while let Some(task) = rx.recv().await {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.dispatch(task).await;
        });
    }
    info!("Task worker stopped, queue closed");
}
