//! Redis Cache 实现

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use threads_errors::{AppError, AppResult};
use threads_ports::CachePort;
use tracing::debug;

/// Redis Cache
///
/// ConnectionManager 克隆开销很小，每次调用克隆一份使用。
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CachePort for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| AppError::connection(format!("Redis get failed: {}", e)))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = match ttl {
            Some(duration) => conn.set_ex(key, value, duration.as_secs().max(1)).await,
            None => conn.set(key, value).await,
        };
        result.map_err(|e| AppError::connection(format!("Redis set failed: {}", e)))?;

        debug!(key = key, "Cache entry set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| AppError::connection(format!("Redis delete failed: {}", e)))
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        conn.exists(key)
            .await
            .map_err(|e| AppError::connection(format!("Redis exists failed: {}", e)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.expire::<_, ()>(key, ttl.as_secs() as i64)
            .await
            .map_err(|e| AppError::connection(format!("Redis expire failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect;
    use threads_ports::following_cache_key;

    #[tokio::test]
    #[ignore] // 需要 Redis 实例
    async fn test_follow_entry_roundtrip() {
        let conn = connect("redis://127.0.0.1:6379").await.unwrap();
        let cache = RedisCache::new(conn);
        let key = following_cache_key(1, 2);

        cache.set(&key, "1", None).await.unwrap();
        assert!(cache.exists(&key).await.unwrap());
        cache.delete(&key).await.unwrap();
        assert!(!cache.exists(&key).await.unwrap());
    }
}
