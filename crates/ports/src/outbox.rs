//! Outbox trait 定义

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use threads_errors::AppResult;
use uuid::Uuid;

/// Outbox 记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub event_id: Uuid,
    pub event_type: String,
    /// 总线 key 的第二段，只用于分区亲和
    pub routing_hint: String,
    pub payload: Vec<u8>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OutboxRecord {
    /// 创建一条待发布记录
    pub fn pending(
        event_type: impl Into<String>,
        routing_hint: Option<String>,
        payload: Vec<u8>,
        retention: chrono::Duration,
    ) -> Self {
        let event_id = Uuid::now_v7();
        let created_at = Utc::now();
        Self {
            event_id,
            event_type: event_type.into(),
            routing_hint: routing_hint.unwrap_or_else(|| event_id.to_string()),
            payload,
            published: false,
            created_at,
            expires_at: created_at + retention,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Outbox trait
#[async_trait]
pub trait OutboxPort: Send + Sync {
    /// 获取最多 limit 条未发布记录，不保证顺序
    async fn fetch_unpublished(&self, limit: usize) -> AppResult<Vec<OutboxRecord>>;

    /// 标记记录为已发布
    async fn mark_published(&self, event_id: Uuid) -> AppResult<()>;

    /// 删除已发布且超过保留期的记录
    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<u64>;
}
