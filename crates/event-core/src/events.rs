//! 领域事件负载

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use threads_errors::{AppError, AppResult};

use crate::EventType;

/// 与固定事件类型绑定的负载
pub trait TypedEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    const EVENT_TYPE: EventType;

    /// 分区亲和提示，同一实体的事件落在同一分区
    fn routing_hint(&self) -> String;

    /// 序列化为 outbox 负载
    fn encode(&self) -> AppResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            AppError::codec(format!(
                "Failed to serialize {} payload: {}",
                Self::EVENT_TYPE,
                e
            ))
        })
    }

    /// 从 outbox 负载反序列化
    fn decode(payload: &[u8]) -> AppResult<Self> {
        serde_json::from_slice(payload).map_err(|e| {
            AppError::codec(format!(
                "Failed to deserialize {} payload: {}",
                Self::EVENT_TYPE,
                e
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCreated {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl TypedEvent for UserCreated {
    const EVENT_TYPE: EventType = EventType::UserCreated;

    fn routing_hint(&self) -> String {
        self.user_id.to_string()
    }
}

/// user_id 关注了 following_id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFollowed {
    pub user_id: i64,
    pub following_id: i64,
    pub followed_at: DateTime<Utc>,
}

impl TypedEvent for UserFollowed {
    const EVENT_TYPE: EventType = EventType::UserFollowed;

    fn routing_hint(&self) -> String {
        self.following_id.to_string()
    }
}

/// user_id 取消关注 following_id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserUnfollowed {
    pub user_id: i64,
    pub following_id: i64,
    pub unfollowed_at: DateTime<Utc>,
}

impl TypedEvent for UserUnfollowed {
    const EVENT_TYPE: EventType = EventType::UserUnfollowed;

    fn routing_hint(&self) -> String {
        self.following_id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostCreated {
    pub post_id: i64,
    pub user_id: i64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TypedEvent for PostCreated {
    const EVENT_TYPE: EventType = EventType::PostCreated;

    fn routing_hint(&self) -> String {
        self.post_id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeCreated {
    pub post_id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

impl TypedEvent for LikeCreated {
    const EVENT_TYPE: EventType = EventType::LikeCreated;

    fn routing_hint(&self) -> String {
        self.post_id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentCreated {
    pub comment_id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TypedEvent for CommentCreated {
    const EVENT_TYPE: EventType = EventType::CommentCreated;

    fn routing_hint(&self) -> String {
        self.post_id.to_string()
    }
}
