//! Kafka Producer

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use threads_errors::{AppError, AppResult};
use threads_ports::BusProducer;
use tracing::{debug, info, warn};

use crate::config::ProducerConfig;

/// Kafka 总线生产者
///
/// 所有消息写入同一个 topic，key 决定分区。
pub struct KafkaBusProducer {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaBusProducer {
    pub fn new(config: &ProducerConfig) -> AppResult<Self> {
        let mut client_config = ClientConfig::new();

        for (key, value) in config.to_client_config_entries() {
            client_config.set(&key, &value);
        }

        let producer: FutureProducer = client_config.create().map_err(|e| {
            AppError::connection(format!("Failed to create Kafka producer: {}", e))
        })?;

        info!(
            brokers = %config.base.brokers,
            topic = %config.base.topic,
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            topic: config.base.topic.clone(),
            timeout: config.base.request_timeout,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// 刷新所有待发送的消息
    pub fn flush(&self, timeout: Duration) {
        if let Err(e) = self.producer.flush(Timeout::After(timeout)) {
            warn!(error = %e, "Failed to flush Kafka producer");
        }
    }
}

#[async_trait]
impl BusProducer for KafkaBusProducer {
    async fn publish(&self, key: &str, payload: &[u8]) -> AppResult<()> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);

        self.producer
            .send(record, Timeout::After(self.timeout))
            .await
            .map_err(|(e, _)| AppError::publish(format!("Failed to publish message: {}", e)))?;

        debug!(topic = %self.topic, key = key, "Message published");
        Ok(())
    }
}
