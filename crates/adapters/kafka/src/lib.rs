//! threads-adapter-kafka - Kafka 适配器
//!
//! 消息总线生产者与消费者的 rdkafka 实现：
//! - 生产者等待所有副本确认（acks=all）
//! - 消费者关闭自动提交，处理成功后手动提交

mod config;
mod consumer;
mod producer;

pub use config::*;
pub use consumer::*;
pub use producer::*;
