// End-to-end consumer loop scenarios against the in-process store

use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use workq_core::{result_channel, TaskPayload};
use workq_queue::{KeySpace, WorkQueue};
use workq_store::{MemoryStore, StoreAdapter};
use workq_worker::handler::{ExpressionHandler, PrimeCountHandler};
use workq_worker::{ConsumerLoop, ConsumerOptions, HandlerResult, ResultPublisher, TaskHandler};

const LEASE: Duration = Duration::from_secs(30);

fn options(lease: Duration) -> ConsumerOptions {
    ConsumerOptions {
        lease_duration: lease,
        block_timeout: Duration::from_millis(50),
        backoff: Duration::from_millis(10),
        reaper_interval: Duration::from_millis(25),
        language: "rust".to_string(),
        channel: result_channel("rust"),
    }
}

fn fixture<H: TaskHandler + 'static>(
    handler: H,
    lease: Duration,
) -> (Arc<MemoryStore>, Arc<WorkQueue>, ConsumerLoop) {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(WorkQueue::new(store.clone(), KeySpace::new("jobs")));
    let consumer = ConsumerLoop::new(
        queue.clone(),
        ResultPublisher::new(store.clone()),
        Arc::new(handler),
        options(lease),
        "w-test".to_string(),
    );
    (store, queue, consumer)
}

#[tokio::test]
async fn test_prime_count_round_trip() {
    let (store, queue, consumer) = fixture(PrimeCountHandler, LEASE);
    let mut results = store.subscribe("results:rust").await.unwrap();

    let id = queue
        .enqueue(json!({"number": 10, "clientId": "c-7"}))
        .await
        .unwrap();
    let processed = consumer.poll_once().await.unwrap();
    assert_eq!(processed, Some(id));

    let raw = results.next().await.unwrap();
    let envelope: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(envelope["taskId"], json!(id.to_string()));
    assert_eq!(envelope["clientId"], json!("c-7"));
    assert_eq!(envelope["number"], json!(10));
    assert_eq!(envelope["result"], json!("4"));
    assert_eq!(envelope["error"], Value::Null);
    assert_eq!(envelope["language"], json!("rust"));

    // Completed: nothing left to lease or reap
    assert_eq!(queue.requeue_expired().await.unwrap(), 0);
    assert!(queue.lease("w-check", LEASE, None).await.unwrap().is_none());
}

#[tokio::test]
async fn test_division_error_is_published_and_terminal() {
    let (store, queue, consumer) = fixture(ExpressionHandler, Duration::from_millis(50));
    let mut results = store.subscribe("results:rust").await.unwrap();

    queue
        .enqueue(json!({"expression": "1/0", "clientId": "c-1"}))
        .await
        .unwrap();
    consumer.poll_once().await.unwrap();

    let raw = results.next().await.unwrap();
    let envelope: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(envelope["result"], Value::Null);
    assert_eq!(envelope["expression"], json!("1/0"));
    assert!(!envelope["error"].as_str().unwrap().is_empty());

    // A business error completes the task: even after the lease window
    // it never comes back
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(queue.requeue_expired().await.unwrap(), 0);
    assert!(queue.lease("w-check", LEASE, None).await.unwrap().is_none());
}

#[tokio::test]
async fn test_fifo_processing_order() {
    let (store, queue, consumer) = fixture(ExpressionHandler, LEASE);
    let mut results = store.subscribe("results:rust").await.unwrap();

    let first = queue
        .enqueue(json!({"expression": "1+1", "clientId": "a"}))
        .await
        .unwrap();
    let second = queue
        .enqueue(json!({"expression": "2+2", "clientId": "b"}))
        .await
        .unwrap();

    consumer.poll_once().await.unwrap();
    consumer.poll_once().await.unwrap();

    let envelope: Value = serde_json::from_str(&results.next().await.unwrap()).unwrap();
    assert_eq!(envelope["taskId"], json!(first.to_string()));
    assert_eq!(envelope["result"], json!("2"));

    let envelope: Value = serde_json::from_str(&results.next().await.unwrap()).unwrap();
    assert_eq!(envelope["taskId"], json!(second.to_string()));
    assert_eq!(envelope["result"], json!("4"));
}

#[tokio::test]
async fn test_abandoned_task_reaches_a_second_worker() {
    let (store, queue, consumer) = fixture(PrimeCountHandler, LEASE);
    let mut results = store.subscribe("results:rust").await.unwrap();

    let id = queue
        .enqueue(json!({"number": 100, "clientId": "c-1"}))
        .await
        .unwrap();

    // A first worker takes the task and dies without completing it
    let casualty = queue
        .lease("w-dead", Duration::from_millis(40), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(casualty.id(), id);

    // A second worker polls until the lease expires and the reaper
    // returns the task
    let shutdown = consumer.shutdown_handle();
    let runner = tokio::spawn(async move { consumer.run().await });

    let raw = tokio::time::timeout(Duration::from_secs(2), results.next())
        .await
        .expect("task was not redelivered in time")
        .unwrap();
    let envelope: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(envelope["taskId"], json!(id.to_string()));
    assert_eq!(envelope["result"], json!("25"));

    shutdown.notify_one();
    runner.await.unwrap();
}

struct PanickingHandler;

#[async_trait::async_trait]
impl TaskHandler for PanickingHandler {
    async fn handle(&self, _payload: TaskPayload) -> HandlerResult {
        panic!("handler blew up");
    }
}

#[tokio::test]
async fn test_handler_crash_leaves_task_for_redelivery() {
    let (store, queue, consumer) = fixture(PanickingHandler, Duration::from_millis(40));
    let mut results = store.subscribe("results:rust").await.unwrap();

    let id = queue
        .enqueue(json!({"number": 1, "clientId": "c-1"}))
        .await
        .unwrap();
    let processed = consumer.poll_once().await.unwrap();
    assert_eq!(processed, Some(id));

    // The crashed attempt published nothing
    assert!(
        tokio::time::timeout(Duration::from_millis(50), results.next())
            .await
            .is_err()
    );

    // The lease runs out and the task comes back for another worker
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(queue.requeue_expired().await.unwrap(), 1);
    let retaken = queue.lease("w-2", LEASE, None).await.unwrap().unwrap();
    assert_eq!(retaken.id(), id);
}
