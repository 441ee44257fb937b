//! Cache trait 定义

use async_trait::async_trait;
use std::time::Duration;
use threads_errors::AppResult;

/// 缓存 trait
#[async_trait]
pub trait CachePort: Send + Sync {
    /// 获取缓存值
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// 设置缓存值，ttl 为 None 时永不过期
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()>;

    /// 删除缓存
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// 检查是否存在
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// 设置过期时间
    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<()>;
}

/// 关注关系缓存 key
pub fn following_cache_key(user_id: i64, following_id: i64) -> String {
    format!("user:{}:following:{}", user_id, following_id)
}
