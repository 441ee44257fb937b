//! 反规范化投影存储 trait 定义
//!
//! 计数器和二级索引都只由投影处理器写入。

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use threads_errors::AppResult;
use uuid::Uuid;

/// 计数器种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKind {
    /// 用户粉丝数
    Followers,
    /// 用户关注数
    Following,
    PostLikes,
    PostComments,
    PostShares,
}

impl CounterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Followers => "follower_count",
            Self::Following => "following_count",
            Self::PostLikes => "like_count",
            Self::PostComments => "comment_count",
            Self::PostShares => "share_count",
        }
    }
}

/// 某个用户或帖子上的一个计数器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub kind: CounterKind,
    pub owner_id: i64,
}

impl CounterKey {
    pub fn new(kind: CounterKind, owner_id: i64) -> Self {
        Self { kind, owner_id }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind.as_str(), self.owner_id)
    }
}

/// 副作用去重键：同一事件的同一副作用最多生效一次
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EffectKey {
    pub event_id: Uuid,
    pub effect: String,
}

impl EffectKey {
    pub fn new(event_id: Uuid, effect: impl Into<String>) -> Self {
        Self {
            event_id,
            effect: effect.into(),
        }
    }
}

impl fmt::Display for EffectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.event_id, self.effect)
    }
}

/// 一次关注关系变更，`at` 取事件发生时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowChange {
    pub user_id: i64,
    pub following_id: i64,
    pub following: bool,
    pub at: DateTime<Utc>,
}

impl FollowChange {
    pub fn follow(user_id: i64, following_id: i64, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            following_id,
            following: true,
            at,
        }
    }

    pub fn unfollow(user_id: i64, following_id: i64, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            following_id,
            following: false,
            at,
        }
    }

    /// 关系状态翻转时双方计数器的增量
    pub fn delta(&self) -> i64 {
        if self.following { 1 } else { -1 }
    }
}

/// 关注关系变更的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowTransition {
    /// 应用后的关系状态
    pub following: bool,
    /// 状态是否翻转（计数器是否被调整）
    pub flipped: bool,
}

/// 行级原子计数器
#[async_trait]
pub trait CounterPort: Send + Sync {
    /// 计数器行不存在时以 0 创建，已存在时不变
    async fn initialize(&self, keys: &[CounterKey]) -> AppResult<()>;

    /// 按 effect 去重地调整计数器
    ///
    /// 返回 false 表示该 effect 之前已生效，本次未做任何修改。
    async fn apply_once(&self, effect: &EffectKey, key: CounterKey, delta: i64)
    -> AppResult<bool>;

    /// 读取当前值，不存在时为 0
    async fn get(&self, key: CounterKey) -> AppResult<i64>;

    /// 按时间戳应用关注关系变更
    ///
    /// 不晚于已记录时间的变更被忽略，只返回当前状态。关系状态翻转时，
    /// `following_id` 的粉丝数和 `user_id` 的关注数在同一事务中调整。
    async fn apply_follow(&self, change: &FollowChange) -> AppResult<FollowTransition>;

    /// 删除早于 `before` 的副作用账本记录，返回删除条数
    async fn purge_effects(&self, before: DateTime<Utc>) -> AppResult<u64>;
}

/// posts_by_user 行
#[derive(Debug, Clone, PartialEq)]
pub struct PostByUser {
    pub user_id: i64,
    pub post_id: i64,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// likes_by_user 行
#[derive(Debug, Clone, PartialEq)]
pub struct LikeByUser {
    pub user_id: i64,
    pub post_id: i64,
    pub liked_at: DateTime<Utc>,
}

/// comments_by_id / comments_by_author 行
#[derive(Debug, Clone, PartialEq)]
pub struct CommentRow {
    pub comment_id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 二级索引，所有写入都是幂等 upsert
#[async_trait]
pub trait IndexPort: Send + Sync {
    async fn upsert_post_by_user(&self, row: &PostByUser) -> AppResult<()>;

    async fn upsert_like_by_user(&self, row: &LikeByUser) -> AppResult<()>;

    async fn upsert_comment_by_id(&self, row: &CommentRow) -> AppResult<()>;

    async fn upsert_comment_by_author(&self, row: &CommentRow) -> AppResult<()>;
}
