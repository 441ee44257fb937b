//! Redis 连接

use redis::Client;
use redis::aio::ConnectionManager;
use threads_errors::{AppError, AppResult};

/// 创建连接管理器并用 PING 确认 Redis 可达
pub async fn connect(url: &str) -> AppResult<ConnectionManager> {
    let client =
        Client::open(url).map_err(|e| AppError::config(format!("Invalid Redis URL: {}", e)))?;

    let mut conn = ConnectionManager::new(client).await.map_err(|e| {
        AppError::connection(format!("Failed to create Redis connection manager: {}", e))
    })?;

    redis::cmd("PING")
        .query_async::<String>(&mut conn)
        .await
        .map_err(|e| AppError::connection(format!("Redis unreachable: {}", e)))?;

    Ok(conn)
}
