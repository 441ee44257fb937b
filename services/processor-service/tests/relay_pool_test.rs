//! Relay worker 池行为测试

use std::sync::Arc;
use std::time::Duration;

use threads_adapter_memory::{InMemoryBus, InMemoryStorage};
use threads_event_core::MessageKey;
use threads_outbox::{OutboxRelay, WorkerPool, WorkerPoolConfig};
use threads_ports::{AtomicBatch, OutboxRecord, StoragePort};
use tokio_util::sync::CancellationToken;

fn pool_config() -> WorkerPoolConfig {
    WorkerPoolConfig {
        workers: 3,
        poll_interval: Duration::from_secs(5),
        batch_size: 10,
        purge_interval: Duration::from_secs(60),
    }
}

async fn seed(storage: &InMemoryStorage, hints: &[&str], retention: chrono::Duration) -> Vec<OutboxRecord> {
    let records: Vec<OutboxRecord> = hints
        .iter()
        .map(|hint| {
            OutboxRecord::pending("post.created", Some(hint.to_string()), b"{}".to_vec(), retention)
        })
        .collect();
    let batch = records
        .iter()
        .cloned()
        .fold(AtomicBatch::new(), AtomicBatch::outbox);
    storage.execute_atomic_batch(batch).await.unwrap();
    records
}

#[tokio::test(start_paused = true)]
async fn test_rejected_record_does_not_block_others() {
    let storage = InMemoryStorage::new();
    let bus = InMemoryBus::new("threads-events");
    let records = seed(&storage, &["1", "2", "3"], chrono::Duration::hours(24)).await;
    let blocked = MessageKey::new("post.created", "2").to_string();
    bus.reject_key(blocked.as_str());

    let relay = Arc::new(OutboxRelay::new(Arc::new(storage.clone()), Arc::new(bus.producer())));
    let shutdown = CancellationToken::new();
    let pool = WorkerPool::start(pool_config(), relay, &shutdown);

    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(storage.unpublished_count(), 1);
    assert!(!storage.record(records[1].event_id).unwrap().published);
    assert!(bus.messages().iter().all(|m| m.key.as_deref() != Some(blocked.as_str())));

    bus.accept_key(&blocked);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(storage.unpublished_count(), 0);

    pool.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_janitor_purges_only_published_records() {
    let storage = InMemoryStorage::new();
    let bus = InMemoryBus::new("threads-events");
    seed(&storage, &["1", "2"], chrono::Duration::zero()).await;
    bus.reject_key(MessageKey::new("post.created", "2").to_string());

    let relay = Arc::new(OutboxRelay::new(Arc::new(storage.clone()), Arc::new(bus.producer())));
    let shutdown = CancellationToken::new();
    let pool = WorkerPool::start(pool_config(), relay, &shutdown);

    tokio::time::sleep(Duration::from_secs(61)).await;
    shutdown.cancel();
    pool.join().await;

    // 未发布的记录即使过期也保留
    let remaining = storage.outbox_records();
    assert_eq!(remaining.len(), 1);
    assert!(!remaining[0].published);
}
