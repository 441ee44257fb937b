//! Kafka Consumer

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use threads_errors::{AppError, AppResult};
use threads_ports::{BusConsumer, BusMessage};
use tracing::info;

use crate::config::ConsumerConfig;

/// Kafka 总线消费者
///
/// 位置只在 `commit` 时推进，重启后从消费者组已提交的位置继续。
pub struct KafkaBusConsumer {
    consumer: StreamConsumer,
    group_id: String,
}

impl KafkaBusConsumer {
    pub fn new(config: &ConsumerConfig) -> AppResult<Self> {
        let mut client_config = ClientConfig::new();

        for (key, value) in config.to_client_config_entries() {
            client_config.set(&key, &value);
        }

        let consumer: StreamConsumer = client_config.create().map_err(|e| {
            AppError::connection(format!("Failed to create Kafka consumer: {}", e))
        })?;

        consumer
            .subscribe(&[config.base.topic.as_str()])
            .map_err(|e| AppError::connection(format!("Failed to subscribe to topic: {}", e)))?;

        info!(
            group_id = %config.group_id,
            topic = %config.base.topic,
            "Kafka consumer created"
        );

        Ok(Self {
            consumer,
            group_id: config.group_id.clone(),
        })
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

#[async_trait]
impl BusConsumer for KafkaBusConsumer {
    async fn read_message(&self) -> AppResult<BusMessage> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| AppError::connection(format!("Kafka receive error: {}", e)))?;

        Ok(BusMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message
                .key_view::<str>()
                .and_then(|r| r.ok())
                .map(str::to_string),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            timestamp: message.timestamp().to_millis(),
        })
    }

    async fn commit(&self, message: &BusMessage) -> AppResult<()> {
        // 提交的是下一条要读取的位置
        let mut partitions = TopicPartitionList::new();
        partitions
            .add_partition_offset(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset + 1),
            )
            .map_err(|e| AppError::internal(format!("Invalid commit offset: {}", e)))?;

        self.consumer
            .commit(&partitions, CommitMode::Async)
            .map_err(|e| AppError::connection(format!("Failed to commit offset: {}", e)))
    }
}
