use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::error;

use crate::error::{AppResult, IngestError};
use crate::queue::{Task, TaskQueue};

/// In-process task queue backed by an unbounded channel. Delayed redelivery
/// is a spawned sleep-then-send; the worker side drains the receiver.
pub struct InProcessQueue {
    tx: mpsc::UnboundedSender<Task>,
}

impl InProcessQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Task>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl TaskQueue for InProcessQueue {
    async fn enqueue(&self, task: Task) -> AppResult<()> {
        self.tx
            .send(task)
            .map_err(|e| IngestError::QueueUnavailable(e.to_string()).into())
    }

    async fn enqueue_after(&self, task: Task, delay: Duration) -> AppResult<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = tx.send(task) {
                error!("Delayed task lost, queue closed: {}", e);
            }
        });
        Ok(())
    }
}
