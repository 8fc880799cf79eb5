//! End-to-end reconciliation scenarios over the in-memory store and queue
//! with a capturing ledger client.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;

use reconciler::error::AppResult;
use reconciler::ingest::{OrderEventHandler, ProcessorEventHandler};
use reconciler::ledger::client::LedgerApi;
use reconciler::ledger::models::{LedgerPaymentRequest, LedgerResponse};
use reconciler::queue::memory::InProcessQueue;
use reconciler::queue::{Task, TaskKind, TaskQueue};
use reconciler::reconciliation::memory::MemoryStore;
use reconciler::reconciliation::record::LifecycleStatus;
use reconciler::reconciliation::store::ReconciliationStore;
use reconciler::recording::orchestrator::RecordingOrchestrator;

/// Ledger stand-in that records every request. When `reject_with` is set it
/// answers with an application-level rejection instead of success.
#[derive(Default)]
struct MockLedger {
    requests: Mutex<Vec<LedgerPaymentRequest>>,
    reject_with: Mutex<Option<String>>,
}

impl MockLedger {
    fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn reject_all(&self, message: &str) {
        *self.reject_with.lock() = Some(message.to_string());
    }
}

#[async_trait]
impl LedgerApi for MockLedger {
    async fn submit_payment(&self, request: &LedgerPaymentRequest) -> AppResult<LedgerResponse> {
        self.requests.lock().push(request.clone());
        let body = match self.reject_with.lock().clone() {
            Some(message) => format!(
                r#"{{"Result": {{"IsSuccessful": false, "Message": "{}"}}}}"#,
                message
            ),
            None => r#"{"Result": {"IsSuccessful": true, "Message": "ok"}}"#.to_string(),
        };
        Ok(serde_json::from_str(&body).unwrap())
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    ledger: Arc<MockLedger>,
    processor: ProcessorEventHandler,
    orders: OrderEventHandler,
    recorder: RecordingOrchestrator,
    rx: tokio::sync::mpsc::UnboundedReceiver<Task>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MockLedger::default());
        let (queue, rx) = InProcessQueue::new();
        let queue: Arc<dyn TaskQueue> = Arc::new(queue);

        Self {
            processor: ProcessorEventHandler::new(store.clone(), queue.clone()),
            orders: OrderEventHandler::new(store.clone(), queue),
            recorder: RecordingOrchestrator::new(store.clone(), ledger.clone()),
            store,
            ledger,
            rx,
        }
    }

    /// Drain enqueued recording tasks and run the orchestrator for each,
    /// returning the per-run results.
    async fn run_enqueued_recordings(&mut self) -> Vec<AppResult<()>> {
        let mut outcomes = Vec::new();
        while let Ok(task) = self.rx.try_recv() {
            if let TaskKind::RecordPayment(id) = task.kind {
                outcomes.push(self.recorder.run(id).await);
            }
        }
        outcomes
    }
}

fn processor_payload(cart: &str, details: Value) -> Value {
    json!({
        "type": "transaction",
        "transaction_type": "p2m",
        "invoice_number": format!("NULF-CT:{}", cart),
        "transaction_id": format!("tx-{}", cart),
        "kycStatus": "APPROVE",
        "order_reference": format!("ord-ref-{}", cart),
        "client_uuid": format!("client-{}", cart),
        "payment_details": details
    })
}

fn order_payload(cart: &str, external_id: &str) -> Value {
    json!({
        "order": {
            "cart_token": cart,
            "external_id": external_id,
            "id": 42
        }
    })
}

#[tokio::test]
async fn test_order_first_then_processor_records_one_payment() {
    let mut h = Harness::new();

    // source B arrives first: placeholder with the ledger order id
    h.orders
        .handle(&order_payload("cart-1", "3001"))
        .await
        .unwrap();
    let record = h.store.find("cart-1").await.unwrap().unwrap();
    assert_eq!(record.lifecycle_status, LifecycleStatus::Pending);

    // source A completes the picture
    h.processor
        .handle(&processor_payload(
            "cart-1",
            json!([{"id": "sp-1", "type": "UWALLET_TRANSFER", "amount": 75.0, "currency": "USD", "status": "Success"}]),
        ))
        .await
        .unwrap();

    let record = h.store.find("cart-1").await.unwrap().unwrap();
    assert_eq!(record.lifecycle_status, LifecycleStatus::Matched);
    assert!(record.matched_at.is_some());

    let outcomes = h.run_enqueued_recordings().await;
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_ok());

    let record = h.store.find("cart-1").await.unwrap().unwrap();
    assert_eq!(record.lifecycle_status, LifecycleStatus::Recorded);
    assert!(record.recorded_at.is_some());

    assert_eq!(h.ledger.request_count(), 1);
    let request = h.ledger.requests.lock()[0].clone();
    assert_eq!(request.order_id, 3001);
    assert_eq!(request.amount, dec!(75.0));
    assert_eq!(request.reference_number, "NULF-CT:cart-1");
    assert_eq!(request.transaction_id, "sp-1");
    assert_eq!(request.order_reference.as_deref(), Some("ord-ref-cart-1"));
    assert_eq!(request.client_token.as_deref(), Some("client-cart-1"));
}

#[tokio::test]
async fn test_final_status_is_order_independent() {
    let details =
        json!([{"id": "sp-1", "type": "UWALLET_TRANSFER", "amount": 10.0, "status": "Success"}]);

    // A then B
    let mut ab = Harness::new();
    ab.processor
        .handle(&processor_payload("cart-2", details.clone()))
        .await
        .unwrap();
    ab.orders
        .handle(&order_payload("cart-2", "3002"))
        .await
        .unwrap();

    // B then A, with duplicate deliveries of both
    let mut ba = Harness::new();
    ba.orders
        .handle(&order_payload("cart-2", "3002"))
        .await
        .unwrap();
    ba.orders
        .handle(&order_payload("cart-2", "3002"))
        .await
        .unwrap();
    ba.processor
        .handle(&processor_payload("cart-2", details.clone()))
        .await
        .unwrap();
    ba.processor
        .handle(&processor_payload("cart-2", details))
        .await
        .unwrap();

    let left = ab.store.find("cart-2").await.unwrap().unwrap();
    let right = ba.store.find("cart-2").await.unwrap().unwrap();
    assert_eq!(left.lifecycle_status, LifecycleStatus::Matched);
    assert_eq!(right.lifecycle_status, LifecycleStatus::Matched);
    assert_eq!(left.sub_payments, right.sub_payments);
    assert_eq!(left.ledger_order_id, right.ledger_order_id);

    // duplicate deliveries re-enqueue while matched, but only the first
    // run records; the rest find the record already claimed
    assert_eq!(ab.run_enqueued_recordings().await.len(), 1);
    assert_eq!(ba.run_enqueued_recordings().await.len(), 2);
    assert_eq!(ab.ledger.request_count(), 1);
    assert_eq!(ba.ledger.request_count(), 1);
}

#[tokio::test]
async fn test_recording_is_idempotent() {
    let mut h = Harness::new();
    h.orders
        .handle(&order_payload("cart-3", "3003"))
        .await
        .unwrap();
    h.processor
        .handle(&processor_payload(
            "cart-3",
            json!([{"id": "sp-1", "type": "uwallet", "amount": 5.0, "status": "Success"}]),
        ))
        .await
        .unwrap();

    h.run_enqueued_recordings().await;
    assert_eq!(h.ledger.request_count(), 1);

    let record = h.store.find("cart-3").await.unwrap().unwrap();
    assert_eq!(record.lifecycle_status, LifecycleStatus::Recorded);

    // a duplicate delivery of the recording task is a no-op
    h.recorder.run(record.id).await.unwrap();
    assert_eq!(h.ledger.request_count(), 1);

    let record = h.store.find("cart-3").await.unwrap().unwrap();
    assert_eq!(record.lifecycle_status, LifecycleStatus::Recorded);
}

#[tokio::test]
async fn test_declined_entries_are_never_submitted() {
    let mut h = Harness::new();
    h.orders
        .handle(&order_payload("cart-4", "3004"))
        .await
        .unwrap();
    h.processor
        .handle(&processor_payload(
            "cart-4",
            json!([
                {"id": "sp-1", "type": "UWALLET_TRANSFER", "amount": 30.0, "status": "Success"},
                {"id": "sp-2", "type": "LOAD_FUNDS_VIA_CARD", "amount": 20.0, "status": "Declined"},
                {"id": "sp-3", "type": "LOAD_FUNDS_VIA_CASH", "amount": 15.0, "status": "Pending"}
            ]),
        ))
        .await
        .unwrap();

    // 3 entries with 1 declined normalize to exactly 2
    let record = h.store.find("cart-4").await.unwrap().unwrap();
    assert_eq!(record.sub_payments.len(), 2);

    h.run_enqueued_recordings().await;
    assert_eq!(h.ledger.request_count(), 2);
    let requests = h.ledger.requests.lock().clone();
    assert!(requests.iter().all(|r| r.transaction_id != "sp-2"));

    // the cash entry posts as promissory
    let cash = requests.iter().find(|r| r.transaction_id == "sp-3").unwrap();
    assert_eq!(cash.amount, dec!(0));
    assert_eq!(cash.promissory_amount, dec!(15.0));
    assert_eq!(cash.payment_status_type_id, 6);
}

#[tokio::test]
async fn test_failed_attempt_returns_to_matched_until_max() {
    let mut h = Harness::new();
    h.orders
        .handle(&order_payload("cart-5", "3005"))
        .await
        .unwrap();
    h.processor
        .handle(&processor_payload(
            "cart-5",
            json!([{"id": "sp-1", "type": "UWALLET_TRANSFER", "amount": 10.0, "status": "Success"}]),
        ))
        .await
        .unwrap();

    // seed the counter at 3: the next failure retries
    let mut record = h.store.find("cart-5").await.unwrap().unwrap();
    record.recording_attempts = 3;
    h.store.save(&mut record).await.unwrap();

    h.ledger.reject_all("order not found");
    let outcomes = h.run_enqueued_recordings().await;
    assert!(outcomes[0].is_err());

    let record = h.store.find("cart-5").await.unwrap().unwrap();
    assert_eq!(record.lifecycle_status, LifecycleStatus::Matched);
    assert_eq!(record.recording_attempts, 4);
    assert!(record
        .last_error
        .as_deref()
        .unwrap()
        .contains("order not found"));

    // one more failure reaches the ceiling and escalates terminally
    h.recorder.run(record.id).await.unwrap();
    let record = h.store.find("cart-5").await.unwrap().unwrap();
    assert_eq!(record.lifecycle_status, LifecycleStatus::Failed);
    assert_eq!(record.recording_attempts, 5);

    // terminal records are never re-attempted
    let before = h.ledger.request_count();
    h.recorder.run(record.id).await.unwrap();
    assert_eq!(h.ledger.request_count(), before);
}

#[tokio::test]
async fn test_kyc_review_blocks_recording() {
    let mut h = Harness::new();
    h.orders
        .handle(&order_payload("cart-6", "3006"))
        .await
        .unwrap();

    let mut payload = processor_payload(
        "cart-6",
        json!([{"id": "sp-1", "type": "UWALLET_TRANSFER", "amount": 10.0, "status": "Success"}]),
    );
    payload["kycStatus"] = json!("REVIEW");
    h.processor.handle(&payload).await.unwrap();

    let record = h.store.find("cart-6").await.unwrap().unwrap();
    assert_eq!(record.lifecycle_status, LifecycleStatus::KycPending);

    // nothing was enqueued and a stray recording task is a no-op
    assert!(h.run_enqueued_recordings().await.is_empty());
    h.recorder.run(record.id).await.unwrap();
    assert_eq!(h.ledger.request_count(), 0);
}
