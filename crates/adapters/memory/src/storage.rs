//! 内存存储会话与 outbox 表

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use threads_errors::{AppError, AppResult};
use threads_ports::{AtomicBatch, OutboxPort, OutboxRecord, Statement, StoragePort, WriteOp};
use uuid::Uuid;

#[derive(Default)]
struct StorageState {
    mutations: Vec<Statement>,
    outbox: BTreeMap<Uuid, OutboxRecord>,
    failing_batches: usize,
    failing_fetches: usize,
    failing_marks: HashSet<Uuid>,
}

/// 内存存储
///
/// 克隆得到的是同一份数据的另一个句柄。
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<Mutex<StorageState>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接下来 n 个原子批次整体失败
    pub fn fail_next_batches(&self, n: usize) {
        self.state.lock().failing_batches = n;
    }

    /// 接下来 n 次 fetch_unpublished 失败
    pub fn fail_next_fetches(&self, n: usize) {
        self.state.lock().failing_fetches = n;
    }

    /// 该记录的 mark_published 持续失败，直到 clear_mark_failures
    pub fn fail_mark_for(&self, event_id: Uuid) {
        self.state.lock().failing_marks.insert(event_id);
    }

    pub fn clear_mark_failures(&self) {
        self.state.lock().failing_marks.clear();
    }

    /// 已提交的领域变更语句
    pub fn mutations(&self) -> Vec<Statement> {
        self.state.lock().mutations.clone()
    }

    pub fn outbox_records(&self) -> Vec<OutboxRecord> {
        self.state.lock().outbox.values().cloned().collect()
    }

    pub fn record(&self, event_id: Uuid) -> Option<OutboxRecord> {
        self.state.lock().outbox.get(&event_id).cloned()
    }

    pub fn unpublished_count(&self) -> usize {
        self.state
            .lock()
            .outbox
            .values()
            .filter(|r| !r.published)
            .count()
    }
}

#[async_trait]
impl StoragePort for InMemoryStorage {
    async fn execute_atomic_batch(&self, batch: AtomicBatch) -> AppResult<()> {
        let mut state = self.state.lock();

        if state.failing_batches > 0 {
            state.failing_batches -= 1;
            return Err(AppError::storage("Injected batch failure"));
        }

        // 先整体校验，再一次性应用
        for op in batch.ops() {
            if let WriteOp::Outbox(record) = op {
                if state.outbox.contains_key(&record.event_id) {
                    return Err(AppError::storage(format!(
                        "Duplicate outbox event_id {}",
                        record.event_id
                    )));
                }
            }
        }

        for op in batch.into_ops() {
            match op {
                WriteOp::Mutation(statement) => state.mutations.push(statement),
                WriteOp::Outbox(record) => {
                    state.outbox.insert(record.event_id, record);
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl OutboxPort for InMemoryStorage {
    async fn fetch_unpublished(&self, limit: usize) -> AppResult<Vec<OutboxRecord>> {
        let mut state = self.state.lock();

        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            return Err(AppError::storage("Injected fetch failure"));
        }

        Ok(state
            .outbox
            .values()
            .filter(|r| !r.published)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, event_id: Uuid) -> AppResult<()> {
        let mut state = self.state.lock();

        if state.failing_marks.contains(&event_id) {
            return Err(AppError::storage(format!(
                "Injected mark failure for {}",
                event_id
            )));
        }

        match state.outbox.get_mut(&event_id) {
            Some(record) => {
                record.published = true;
                Ok(())
            }
            None => Err(AppError::storage(format!("Outbox record {} not found", event_id))),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state.lock();
        let before = state.outbox.len();
        state
            .outbox
            .retain(|_, r| !(r.published && r.is_expired(now)));
        Ok((before - state.outbox.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(event_type: &str) -> OutboxRecord {
        OutboxRecord::pending(event_type, None, b"{}".to_vec(), chrono::Duration::hours(24))
    }

    #[tokio::test]
    async fn test_failed_batch_applies_nothing() {
        let storage = InMemoryStorage::new();
        storage.fail_next_batches(1);

        let batch = AtomicBatch::new()
            .mutation(Statement::new("INSERT INTO posts").bind(1_i64))
            .outbox(record("post.created"));

        assert!(storage.execute_atomic_batch(batch.clone()).await.is_err());
        assert!(storage.mutations().is_empty());
        assert!(storage.outbox_records().is_empty());

        storage.execute_atomic_batch(batch).await.unwrap();
        assert_eq!(storage.mutations().len(), 1);
        assert_eq!(storage.outbox_records().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_event_id_rejects_whole_batch() {
        let storage = InMemoryStorage::new();
        let rec = record("like.created");
        storage
            .execute_atomic_batch(AtomicBatch::new().outbox(rec.clone()))
            .await
            .unwrap();

        let batch = AtomicBatch::new()
            .mutation(Statement::new("INSERT INTO likes"))
            .outbox(rec);
        assert!(storage.execute_atomic_batch(batch).await.is_err());
        assert!(storage.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_purge_keeps_unpublished_records() {
        let storage = InMemoryStorage::new();
        let published = record("post.created");
        let pending = record("post.created");
        storage
            .execute_atomic_batch(
                AtomicBatch::new()
                    .outbox(published.clone())
                    .outbox(pending.clone()),
            )
            .await
            .unwrap();
        storage.mark_published(published.event_id).await.unwrap();

        let later = Utc::now() + chrono::Duration::hours(25);
        assert_eq!(storage.purge_expired(later).await.unwrap(), 1);
        assert!(storage.record(published.event_id).is_none());
        assert!(storage.record(pending.event_id).is_some());
    }
}
