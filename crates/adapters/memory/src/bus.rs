//! 内存消息总线
//!
//! 单分区日志，按消费者组记录已提交位置，语义与 Kafka 的手动提交一致：
//! 新建的消费者从组的已提交位置开始读取。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use threads_errors::{AppError, AppResult};
use threads_ports::{BusConsumer, BusMessage, BusProducer};
use tokio::sync::Notify;

struct BusInner {
    topic: String,
    log: Mutex<Vec<BusMessage>>,
    committed: Mutex<HashMap<String, i64>>,
    rejected_keys: Mutex<HashSet<String>>,
    failing_reads: Mutex<usize>,
    publish_attempts: Mutex<usize>,
    notify: Notify,
}

/// 内存总线
#[derive(Clone)]
pub struct InMemoryBus {
    inner: Arc<BusInner>,
}

impl InMemoryBus {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                topic: topic.into(),
                log: Mutex::new(Vec::new()),
                committed: Mutex::new(HashMap::new()),
                rejected_keys: Mutex::new(HashSet::new()),
                failing_reads: Mutex::new(0),
                publish_attempts: Mutex::new(0),
                notify: Notify::new(),
            }),
        }
    }

    pub fn producer(&self) -> InMemoryProducer {
        InMemoryProducer {
            inner: self.inner.clone(),
        }
    }

    /// 创建消费者，从该组已提交的位置开始读取
    pub fn consumer(&self, group_id: impl Into<String>) -> InMemoryConsumer {
        let group_id = group_id.into();
        let position = self.committed_offset(&group_id);
        InMemoryConsumer {
            inner: self.inner.clone(),
            group_id,
            position: Mutex::new(position),
        }
    }

    /// 拒绝该 key 的发布，直到 accept_key
    pub fn reject_key(&self, key: impl Into<String>) {
        self.inner.rejected_keys.lock().insert(key.into());
    }

    pub fn accept_key(&self, key: &str) {
        self.inner.rejected_keys.lock().remove(key);
    }

    /// 接下来 n 次读取返回错误
    pub fn fail_next_reads(&self, n: usize) {
        *self.inner.failing_reads.lock() = n;
    }

    /// 直接追加一条消息，绕过生产者
    pub fn inject(&self, key: Option<&str>, payload: Vec<u8>) {
        self.append(key.map(str::to_string), payload);
    }

    pub fn messages(&self) -> Vec<BusMessage> {
        self.inner.log.lock().clone()
    }

    /// 包括被拒绝在内的发布尝试次数
    pub fn publish_attempts(&self) -> usize {
        *self.inner.publish_attempts.lock()
    }

    /// 组的已提交位置（下一条要读取的 offset）
    pub fn committed_offset(&self, group_id: &str) -> i64 {
        self.inner
            .committed
            .lock()
            .get(group_id)
            .copied()
            .unwrap_or(0)
    }

    fn append(&self, key: Option<String>, payload: Vec<u8>) {
        {
            let mut log = self.inner.log.lock();
            let offset = log.len() as i64;
            log.push(BusMessage {
                topic: self.inner.topic.clone(),
                partition: 0,
                offset,
                key,
                payload,
                timestamp: Some(Utc::now().timestamp_millis()),
            });
        }
        self.inner.notify.notify_waiters();
    }
}

/// 内存总线生产者
#[derive(Clone)]
pub struct InMemoryProducer {
    inner: Arc<BusInner>,
}

#[async_trait]
impl BusProducer for InMemoryProducer {
    async fn publish(&self, key: &str, payload: &[u8]) -> AppResult<()> {
        *self.inner.publish_attempts.lock() += 1;

        if self.inner.rejected_keys.lock().contains(key) {
            return Err(AppError::publish(format!(
                "Broker rejected message with key {}",
                key
            )));
        }

        InMemoryBus {
            inner: self.inner.clone(),
        }
        .append(Some(key.to_string()), payload.to_vec());
        Ok(())
    }
}

/// 内存总线消费者
pub struct InMemoryConsumer {
    inner: Arc<BusInner>,
    group_id: String,
    position: Mutex<i64>,
}

impl InMemoryConsumer {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

#[async_trait]
impl BusConsumer for InMemoryConsumer {
    async fn read_message(&self) -> AppResult<BusMessage> {
        {
            let mut failing = self.inner.failing_reads.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(AppError::connection("Injected read failure"));
            }
        }

        loop {
            // 先注册等待，再检查日志，避免丢失唤醒
            let notified = self.inner.notify.notified();
            {
                let log = self.inner.log.lock();
                let mut position = self.position.lock();
                if let Some(message) = log.get(*position as usize) {
                    *position += 1;
                    return Ok(message.clone());
                }
            }
            notified.await;
        }
    }

    async fn commit(&self, message: &BusMessage) -> AppResult<()> {
        let mut committed = self.inner.committed.lock();
        let next = committed.entry(self.group_id.clone()).or_insert(0);
        *next = (*next).max(message.offset + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_new_consumer_resumes_from_committed_offset() {
        let bus = InMemoryBus::new("threads-events");
        let producer = bus.producer();
        producer.publish("post.created:1", b"a").await.unwrap();
        producer.publish("post.created:2", b"b").await.unwrap();

        let first = bus.consumer("post-service");
        let m0 = first.read_message().await.unwrap();
        first.commit(&m0).await.unwrap();
        let m1 = first.read_message().await.unwrap();
        assert_eq!(m1.offset, 1);
        drop(first);

        // m1 未提交，重启后重新投递
        let second = bus.consumer("post-service");
        let again = second.read_message().await.unwrap();
        assert_eq!(again.offset, 1);
        assert_eq!(again.payload, b"b");
    }

    #[tokio::test]
    async fn test_read_blocks_until_publish() {
        let bus = InMemoryBus::new("threads-events");
        let consumer = bus.consumer("user-service");

        let producer = bus.producer();
        let publisher = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.publish("user.created:9", b"x").await.unwrap();
        });

        let message = tokio::time::timeout(Duration::from_secs(1), consumer.read_message())
            .await
            .expect("read should complete after publish")
            .unwrap();
        assert_eq!(message.key.as_deref(), Some("user.created:9"));
        publisher.await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_key() {
        let bus = InMemoryBus::new("threads-events");
        bus.reject_key("like.created:5");

        let producer = bus.producer();
        assert!(producer.publish("like.created:5", b"x").await.is_err());
        assert!(bus.messages().is_empty());
        assert_eq!(bus.publish_attempts(), 1);

        bus.accept_key("like.created:5");
        producer.publish("like.created:5", b"x").await.unwrap();
        assert_eq!(bus.messages().len(), 1);
    }
}
