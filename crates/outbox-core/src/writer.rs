//! Outbox 写入器

use std::sync::Arc;
use std::time::Duration;

use threads_errors::{AppError, AppResult};
use threads_event_core::{EventType, TypedEvent};
use threads_ports::{AtomicBatch, OutboxRecord, Statement, StoragePort};
use tracing::debug;
use uuid::Uuid;

/// Outbox 写入器
///
/// 领域变更语句和一条未发布的 outbox 记录作为一个原子批次提交，
/// 要么全部生效，要么全部不生效。失败后调用方应视为什么都没发生。
pub struct OutboxWriter {
    storage: Arc<dyn StoragePort>,
    retention: chrono::Duration,
}

impl OutboxWriter {
    pub fn new(storage: Arc<dyn StoragePort>, retention: Duration) -> AppResult<Self> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|e| AppError::config(format!("Invalid outbox retention: {}", e)))?;
        Ok(Self { storage, retention })
    }

    /// 写入已序列化的事件
    ///
    /// routing_hint 为 None 时使用 event_id。
    pub async fn append_event(
        &self,
        mutations: Vec<Statement>,
        event_type: EventType,
        payload: Vec<u8>,
        routing_hint: Option<String>,
    ) -> AppResult<Uuid> {
        let record = OutboxRecord::pending(event_type.as_str(), routing_hint, payload, self.retention);
        let event_id = record.event_id;

        let batch = mutations
            .into_iter()
            .fold(AtomicBatch::new(), AtomicBatch::mutation)
            .outbox(record);

        self.storage.execute_atomic_batch(batch).await?;

        debug!(
            event_id = %event_id,
            event_type = %event_type,
            "Outbox event appended"
        );

        Ok(event_id)
    }

    /// 序列化强类型事件并写入
    pub async fn append<E: TypedEvent>(
        &self,
        mutations: Vec<Statement>,
        event: &E,
    ) -> AppResult<Uuid> {
        let payload = event.encode()?;
        self.append_event(mutations, E::EVENT_TYPE, payload, Some(event.routing_hint()))
            .await
    }
}
