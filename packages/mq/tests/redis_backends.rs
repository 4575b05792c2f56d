//! Behaviour of the Redis store and queue against a live server.
//!
//! Run with `REDIS_URL=redis://127.0.0.1:6379 cargo test -p mq -- --ignored`.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use common::storage::{RedisStore, result_key, submission_key};
use common::{ExecutionResult, JobQueue, MetadataStore, NewSubmission, SubmissionStatus, Verdict};
use mq::{Intake, RedisQueue, SubmissionView};

fn client() -> redis::Client {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
    redis::Client::open(url).unwrap()
}

fn unique(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}:{}:{nanos}", std::process::id())
}

async fn delete(client: &redis::Client, keys: &[String]) {
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let _: i64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await.unwrap();
}

#[tokio::test]
#[ignore = "requires redis"]
async fn test_queue_is_fifo_for_a_single_producer() {
    let client = client();
    let key = unique("test:queue");
    let queue = RedisQueue::connect(&client, key.clone()).await.unwrap();

    for id in ["A", "B", "C"] {
        queue.enqueue(id).await.unwrap();
    }
    assert_eq!(queue.len().await.unwrap(), 3);

    let mut order = Vec::new();
    while let Some(id) = queue.dequeue(Duration::ZERO).await.unwrap() {
        order.push(id);
    }
    assert_eq!(order, ["A", "B", "C"]);

    // The blocking path pops from the same end.
    queue.enqueue("D").await.unwrap();
    queue.enqueue("E").await.unwrap();
    assert_eq!(
        queue.dequeue(Duration::from_secs(1)).await.unwrap().as_deref(),
        Some("D")
    );
    assert_eq!(
        queue.dequeue(Duration::from_secs(1)).await.unwrap().as_deref(),
        Some("E")
    );

    delete(&client, &[key]).await;
}

#[tokio::test]
#[ignore = "requires redis"]
async fn test_bounded_pop_on_empty_queue_returns_none() {
    let client = client();
    let queue = RedisQueue::connect(&client, unique("test:queue")).await.unwrap();

    let started = Instant::now();
    let popped = queue.dequeue(Duration::from_millis(300)).await.unwrap();

    assert_eq!(popped, None);
    assert!(started.elapsed() >= Duration::from_millis(250));
    assert!(queue.is_empty().await.unwrap());
}

#[tokio::test]
#[ignore = "requires redis"]
async fn test_result_is_written_once() {
    let client = client();
    let store = RedisStore::connect(&client).await.unwrap();
    let id = unique("test-result");

    let first = ExecutionResult::new(&id, Verdict::Accepted, "hi\n".into(), String::new());
    let second = ExecutionResult::new(&id, Verdict::RuntimeError, String::new(), "boom".into());

    assert!(store.save_result(&first).await.unwrap());
    assert!(!store.save_result(&second).await.unwrap());
    assert_eq!(store.load_result(&id).await.unwrap(), Some(first));

    delete(&client, &[result_key(&id)]).await;
}

#[tokio::test]
#[ignore = "requires redis"]
async fn test_intake_round_trip() {
    let client = client();
    let key = unique("test:queue");
    let store = Arc::new(RedisStore::connect(&client).await.unwrap());
    let queue = Arc::new(RedisQueue::connect(&client, key.clone()).await.unwrap());
    let intake = Intake::new(store, queue.clone());

    let ticket = intake
        .submit(NewSubmission {
            language: "python".into(),
            code: "print('hi')".into(),
            input: String::new(),
            time_limit_ms: 1000,
            memory_limit_mb: 128,
        })
        .await
        .unwrap();

    assert_eq!(intake.backlog().await.unwrap(), 1);
    assert_eq!(
        intake.query(&ticket.id).await.unwrap(),
        SubmissionView::Pending {
            id: ticket.id.clone(),
            status: SubmissionStatus::Queued
        }
    );
    assert_eq!(
        queue.dequeue(Duration::ZERO).await.unwrap().as_deref(),
        Some(ticket.id.as_str())
    );

    delete(&client, &[key, submission_key(&ticket.id)]).await;
}
