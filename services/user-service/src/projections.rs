//! 用户事件投影

use std::sync::Arc;

use async_trait::async_trait;
use threads_errors::{AppError, AppResult};
use threads_event_core::{EventType, UserCreated, UserFollowed, UserUnfollowed};
use threads_ports::{
    CachePort, CounterKey, CounterKind, CounterPort, FollowChange, following_cache_key,
};
use threads_projection::{EventContext, EventHandler, HandlerRegistry, RegistryBuilder};
use tracing::debug;

/// 本服务必须处理的事件类型
pub fn required_event_types() -> &'static [EventType] {
    &[
        EventType::UserCreated,
        EventType::UserFollowed,
        EventType::UserUnfollowed,
    ]
}

/// 用户计数器与关注缓存的投影
///
/// 关注和取消关注按事件时间取最新状态：重复投递或乱序到达的旧事件
/// 不会改变计数器，缓存总是写成关系的当前状态。
pub struct UserProjections {
    counters: Arc<dyn CounterPort>,
    cache: Arc<dyn CachePort>,
}

impl UserProjections {
    pub fn new(counters: Arc<dyn CounterPort>, cache: Arc<dyn CachePort>) -> Self {
        Self { counters, cache }
    }

    async fn apply(&self, ctx: &EventContext, change: FollowChange) -> AppResult<()> {
        let transition = self
            .counters
            .apply_follow(&change)
            .await
            .map_err(|e| AppError::handler("follow_state", e.to_string()))?;
        if !transition.flipped {
            debug!(
                event_id = %ctx.event_id,
                user_id = change.user_id,
                following_id = change.following_id,
                following = transition.following,
                "Follow state unchanged"
            );
        }

        let cache_key = following_cache_key(change.user_id, change.following_id);
        let written = if transition.following {
            self.cache.set(&cache_key, "1", None).await
        } else {
            self.cache.delete(&cache_key).await
        };
        written.map_err(|e| AppError::handler("following_cache", e.to_string()))
    }
}

#[async_trait]
impl EventHandler<UserCreated> for UserProjections {
    async fn handle(&self, _ctx: &EventContext, event: UserCreated) -> AppResult<()> {
        self.counters
            .initialize(&[
                CounterKey::new(CounterKind::Followers, event.user_id),
                CounterKey::new(CounterKind::Following, event.user_id),
            ])
            .await
    }
}

#[async_trait]
impl EventHandler<UserFollowed> for UserProjections {
    async fn handle(&self, ctx: &EventContext, event: UserFollowed) -> AppResult<()> {
        self.apply(
            ctx,
            FollowChange::follow(event.user_id, event.following_id, event.followed_at),
        )
        .await
    }
}

#[async_trait]
impl EventHandler<UserUnfollowed> for UserProjections {
    async fn handle(&self, ctx: &EventContext, event: UserUnfollowed) -> AppResult<()> {
        self.apply(
            ctx,
            FollowChange::unfollow(event.user_id, event.following_id, event.unfollowed_at),
        )
        .await
    }
}

/// 构建本服务的处理器表
pub fn build_registry(projections: UserProjections) -> AppResult<HandlerRegistry> {
    let projections = Arc::new(projections);
    RegistryBuilder::new()
        .register::<UserCreated, _>(projections.clone())
        .register::<UserFollowed, _>(projections.clone())
        .register::<UserUnfollowed, _>(projections)
        .build(required_event_types())
}
