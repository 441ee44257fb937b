//! 消息总线 trait 定义

use async_trait::async_trait;
use threads_errors::AppResult;

/// 从总线读取的消息
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
}

/// 总线生产者
#[async_trait]
pub trait BusProducer: Send + Sync {
    /// 发布一条消息，所有副本确认后返回
    async fn publish(&self, key: &str, payload: &[u8]) -> AppResult<()>;
}

/// 总线消费者
#[async_trait]
pub trait BusConsumer: Send + Sync {
    /// 读取下一条未消费的消息，没有消息时阻塞
    async fn read_message(&self) -> AppResult<BusMessage>;

    /// 推进持久化的读取位置
    async fn commit(&self, message: &BusMessage) -> AppResult<()>;
}
