//! processor-service - outbox relay
//!
//! 定时把未发布的 outbox 记录推送到 Kafka

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    threads_bootstrap::run_relay("config").await
}
