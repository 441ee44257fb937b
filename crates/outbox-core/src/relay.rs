//! Outbox 中继
//!
//! 扫描未发布记录，发布到消息总线后标记为已发布

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use threads_errors::AppResult;
use threads_event_core::{EventEnvelope, MessageKey};
use threads_ports::{BusProducer, OutboxPort, OutboxRecord};
use tracing::{debug, error, info, warn};

/// Outbox 中继
///
/// 每条记录独立处理：发布或标记失败只记录日志，记录保持未发布，
/// 下一轮轮询会再次选中。发布成功但标记失败时会重复发布，
/// 下游必须容忍同一 event_id 的重复投递。
pub struct OutboxRelay {
    outbox: Arc<dyn OutboxPort>,
    producer: Arc<dyn BusProducer>,
}

impl OutboxRelay {
    pub fn new(outbox: Arc<dyn OutboxPort>, producer: Arc<dyn BusProducer>) -> Self {
        Self { outbox, producer }
    }

    /// 执行一轮中继，返回发布并标记成功的记录数
    ///
    /// 只有读取 outbox 失败时才返回错误。
    pub async fn poll_batch(&self, limit: usize) -> AppResult<usize> {
        if limit == 0 {
            return Ok(0);
        }

        let mut records = self.outbox.fetch_unpublished(limit).await?;
        records.truncate(limit);

        if records.is_empty() {
            return Ok(0);
        }

        debug!(count = records.len(), "Relaying pending outbox records");

        let mut processed = 0;
        let mut failed = 0;

        for record in &records {
            if self.relay_record(record).await {
                processed += 1;
            } else {
                failed += 1;
            }
        }

        if processed > 0 || failed > 0 {
            info!(processed, failed, "Outbox relay pass finished");
        }

        Ok(processed)
    }

    async fn relay_record(&self, record: &OutboxRecord) -> bool {
        let key = MessageKey::new(record.event_type.as_str(), record.routing_hint.as_str()).to_string();

        let value = match EventEnvelope::new(
            record.event_id,
            record.event_type.as_str(),
            record.payload.clone(),
        )
        .to_bytes()
        {
            Ok(value) => value,
            Err(e) => {
                error!(
                    event_id = %record.event_id,
                    event_type = %record.event_type,
                    error = %e,
                    "Failed to encode outbox envelope"
                );
                counter!("outbox_relay_failed_total", "stage" => "encode").increment(1);
                return false;
            }
        };

        if let Err(e) = self.producer.publish(&key, &value).await {
            error!(
                event_id = %record.event_id,
                event_type = %record.event_type,
                key = %key,
                error = %e,
                "Failed to publish outbox record"
            );
            counter!("outbox_relay_failed_total", "stage" => "publish").increment(1);
            return false;
        }

        if let Err(e) = self.outbox.mark_published(record.event_id).await {
            // 已经到达总线，下一轮会重复发布
            warn!(
                event_id = %record.event_id,
                event_type = %record.event_type,
                error = %e,
                "Published outbox record but failed to mark it"
            );
            counter!("outbox_relay_failed_total", "stage" => "mark").increment(1);
            return false;
        }

        counter!("outbox_relay_published_total").increment(1);
        true
    }

    /// 删除已发布且超过保留期的记录
    pub async fn purge_expired(&self) -> AppResult<u64> {
        let deleted = self.outbox.purge_expired(Utc::now()).await?;
        if deleted > 0 {
            info!(count = deleted, "Purged expired outbox records");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use threads_adapter_memory::{InMemoryBus, InMemoryStorage};
    use threads_event_core::{EventType, LikeCreated, TypedEvent};
    use threads_ports::{AtomicBatch, StoragePort};
    use uuid::Uuid;

    use crate::OutboxWriter;

    struct Fixture {
        storage: InMemoryStorage,
        bus: InMemoryBus,
        relay: OutboxRelay,
        writer: OutboxWriter,
    }

    fn fixture() -> Fixture {
        let storage = InMemoryStorage::new();
        let bus = InMemoryBus::new("threads-events");
        let relay = OutboxRelay::new(Arc::new(storage.clone()), Arc::new(bus.producer()));
        let writer =
            OutboxWriter::new(Arc::new(storage.clone()), Duration::from_secs(86400)).unwrap();
        Fixture {
            storage,
            bus,
            relay,
            writer,
        }
    }

    async fn append_likes(writer: &OutboxWriter, post_ids: &[i64]) -> Vec<Uuid> {
        let mut ids = Vec::new();
        for post_id in post_ids {
            let event = LikeCreated {
                post_id: *post_id,
                user_id: 1,
                created_at: Utc::now(),
            };
            ids.push(writer.append(Vec::new(), &event).await.unwrap());
        }
        ids
    }

    #[tokio::test]
    async fn test_all_pending_records_are_published() {
        let f = fixture();
        let ids = append_likes(&f.writer, &[1, 2, 3]).await;

        let processed = f.relay.poll_batch(10).await.unwrap();

        assert_eq!(processed, 3);
        for id in ids {
            assert!(f.storage.record(id).unwrap().published);
        }
        assert_eq!(f.bus.messages().len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_record_stays_pending() {
        let f = fixture();
        let ids = append_likes(&f.writer, &[1, 2, 3]).await;
        f.bus.reject_key("like.created:2");

        let processed = f.relay.poll_batch(10).await.unwrap();

        assert_eq!(processed, 2);
        assert!(f.storage.record(ids[0]).unwrap().published);
        assert!(!f.storage.record(ids[1]).unwrap().published);
        assert!(f.storage.record(ids[2]).unwrap().published);

        // 下一轮只重试失败的记录
        f.bus.accept_key("like.created:2");
        assert_eq!(f.relay.poll_batch(10).await.unwrap(), 1);
        assert_eq!(f.storage.unpublished_count(), 0);
    }

    #[tokio::test]
    async fn test_mark_failure_republishes_on_next_pass() {
        let f = fixture();
        let ids = append_likes(&f.writer, &[5]).await;
        f.storage.fail_mark_for(ids[0]);

        assert_eq!(f.relay.poll_batch(10).await.unwrap(), 0);
        assert_eq!(f.bus.messages().len(), 1);
        assert!(!f.storage.record(ids[0]).unwrap().published);

        f.storage.clear_mark_failures();
        assert_eq!(f.relay.poll_batch(10).await.unwrap(), 1);

        // 同一 event_id 到达总线两次
        let messages = f.bus.messages();
        assert_eq!(messages.len(), 2);
        let first = EventEnvelope::from_bytes(&messages[0].payload).unwrap();
        let second = EventEnvelope::from_bytes(&messages[1].payload).unwrap();
        assert_eq!(first.event_id, ids[0]);
        assert_eq!(second.event_id, ids[0]);
    }

    #[tokio::test]
    async fn test_processed_count_never_exceeds_limit() {
        let f = fixture();
        append_likes(&f.writer, &[1, 2, 3, 4, 5]).await;

        assert_eq!(f.relay.poll_batch(2).await.unwrap(), 2);
        assert_eq!(f.storage.unpublished_count(), 3);
        assert_eq!(f.relay.poll_batch(0).await.unwrap(), 0);
        assert_eq!(f.relay.poll_batch(10).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported() {
        let f = fixture();
        append_likes(&f.writer, &[1]).await;
        f.storage.fail_next_fetches(1);

        assert!(f.relay.poll_batch(10).await.is_err());
        assert_eq!(f.relay.poll_batch(10).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_message_key_and_envelope() {
        let f = fixture();
        let event = LikeCreated {
            post_id: 42,
            user_id: 7,
            created_at: Utc::now(),
        };
        let id = f.writer.append(Vec::new(), &event).await.unwrap();
        f.relay.poll_batch(10).await.unwrap();

        let message = &f.bus.messages()[0];
        assert_eq!(message.key.as_deref(), Some("like.created:42"));
        let envelope = EventEnvelope::from_bytes(&message.payload).unwrap();
        assert_eq!(envelope.event_id, id);
        assert_eq!(envelope.event_type, EventType::LikeCreated.as_str());
        assert_eq!(LikeCreated::decode(&envelope.payload).unwrap(), event);
    }

    #[tokio::test]
    async fn test_purge_removes_only_published_expired_records() {
        let storage = InMemoryStorage::new();
        let bus = InMemoryBus::new("threads-events");
        let relay = OutboxRelay::new(Arc::new(storage.clone()), Arc::new(bus.producer()));

        let expired = threads_ports::OutboxRecord::pending(
            "post.created",
            None,
            b"{}".to_vec(),
            chrono::Duration::zero(),
        );
        let pending = threads_ports::OutboxRecord::pending(
            "post.created",
            None,
            b"{}".to_vec(),
            chrono::Duration::zero(),
        );
        storage
            .execute_atomic_batch(AtomicBatch::new().outbox(expired.clone()).outbox(pending.clone()))
            .await
            .unwrap();
        storage.mark_published(expired.event_id).await.unwrap();

        assert_eq!(relay.purge_expired().await.unwrap(), 1);
        assert!(storage.record(expired.event_id).is_none());
        assert!(storage.record(pending.event_id).is_some());
    }
}
