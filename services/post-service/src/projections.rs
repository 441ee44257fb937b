//! 帖子事件投影

use std::sync::Arc;

use async_trait::async_trait;
use threads_errors::AppResult;
use threads_event_core::{CommentCreated, EventType, LikeCreated, PostCreated};
use threads_ports::{CounterKey, CounterKind, CounterPort, IndexPort, LikeByUser, PostByUser};
use threads_projection::{EffectGroup, EventContext, EventHandler, HandlerRegistry, RegistryBuilder};

pub fn required_event_types() -> &'static [EventType] {
    &[
        EventType::PostCreated,
        EventType::LikeCreated,
        EventType::CommentCreated,
    ]
}

/// 帖子索引与互动计数的投影
pub struct PostProjections {
    counters: Arc<dyn CounterPort>,
    index: Arc<dyn IndexPort>,
}

impl PostProjections {
    pub fn new(counters: Arc<dyn CounterPort>, index: Arc<dyn IndexPort>) -> Self {
        Self { counters, index }
    }

    async fn increment(&self, ctx: &EventContext, key: CounterKey) -> AppResult<()> {
        self.counters
            .apply_once(&ctx.effect_key(key.kind.as_str()), key, 1)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl EventHandler<PostCreated> for PostProjections {
    async fn handle(&self, _ctx: &EventContext, event: PostCreated) -> AppResult<()> {
        let row = PostByUser {
            user_id: event.user_id,
            post_id: event.post_id,
            content: event.content,
            image_url: event.image_url,
            created_at: event.created_at,
        };
        let engagement = [
            CounterKey::new(CounterKind::PostLikes, event.post_id),
            CounterKey::new(CounterKind::PostComments, event.post_id),
            CounterKey::new(CounterKind::PostShares, event.post_id),
        ];

        EffectGroup::new()
            .with("posts_by_user", self.index.upsert_post_by_user(&row))
            .with("post_counters", self.counters.initialize(&engagement))
            .join()
            .await
    }
}

#[async_trait]
impl EventHandler<LikeCreated> for PostProjections {
    async fn handle(&self, ctx: &EventContext, event: LikeCreated) -> AppResult<()> {
        let row = LikeByUser {
            user_id: event.user_id,
            post_id: event.post_id,
            liked_at: event.created_at,
        };

        EffectGroup::new()
            .with("likes_by_user", self.index.upsert_like_by_user(&row))
            .with(
                "like_count",
                self.increment(ctx, CounterKey::new(CounterKind::PostLikes, event.post_id)),
            )
            .join()
            .await
    }
}

#[async_trait]
impl EventHandler<CommentCreated> for PostProjections {
    async fn handle(&self, ctx: &EventContext, event: CommentCreated) -> AppResult<()> {
        self.increment(ctx, CounterKey::new(CounterKind::PostComments, event.post_id))
            .await
    }
}

pub fn build_registry(projections: PostProjections) -> AppResult<HandlerRegistry> {
    let projections = Arc::new(projections);
    RegistryBuilder::new()
        .register::<PostCreated, _>(projections.clone())
        .register::<LikeCreated, _>(projections.clone())
        .register::<CommentCreated, _>(projections)
        .build(required_event_types())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use threads_adapter_memory::{InMemoryCounters, InMemoryIndex};
    use uuid::Uuid;

    fn ctx(event_type: EventType) -> EventContext {
        EventContext {
            event_id: Uuid::now_v7(),
            event_type,
            routing_hint: "10".to_string(),
            partition: 0,
            offset: 0,
        }
    }

    fn projections() -> (PostProjections, InMemoryCounters, InMemoryIndex) {
        let counters = InMemoryCounters::new();
        let index = InMemoryIndex::new();
        (
            PostProjections::new(Arc::new(counters.clone()), Arc::new(index.clone())),
            counters,
            index,
        )
    }

    #[tokio::test]
    async fn test_post_created_is_idempotent() {
        let (projections, counters, index) = projections();
        let event = PostCreated {
            post_id: 10,
            user_id: 1,
            content: "hello".to_string(),
            image_url: None,
            created_at: Utc::now(),
        };
        let ctx = ctx(EventType::PostCreated);

        projections.handle(&ctx, event.clone()).await.unwrap();
        projections.handle(&ctx, event).await.unwrap();

        assert_eq!(index.posts_by_user(1).len(), 1);
        assert!(counters.contains(CounterKey::new(CounterKind::PostShares, 10)));
        assert_eq!(counters.value(CounterKey::new(CounterKind::PostLikes, 10)), 0);
    }

    #[tokio::test]
    async fn test_like_redelivery_counts_once() {
        let (projections, counters, index) = projections();
        let event = LikeCreated {
            post_id: 10,
            user_id: 2,
            created_at: Utc::now(),
        };
        let ctx = ctx(EventType::LikeCreated);

        projections.handle(&ctx, event.clone()).await.unwrap();
        projections.handle(&ctx, event).await.unwrap();

        assert_eq!(counters.value(CounterKey::new(CounterKind::PostLikes, 10)), 1);
        assert_eq!(index.likes_by_user(2).len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_likes_accumulate() {
        let (projections, counters, _) = projections();

        for user_id in 1..=3 {
            let event = LikeCreated {
                post_id: 10,
                user_id,
                created_at: Utc::now(),
            };
            projections
                .handle(&ctx(EventType::LikeCreated), event)
                .await
                .unwrap();
        }

        assert_eq!(counters.value(CounterKey::new(CounterKind::PostLikes, 10)), 3);
    }

    #[tokio::test]
    async fn test_index_failure_fails_like() {
        let (projections, _, index) = projections();
        index.fail_next_upserts(1);
        let event = LikeCreated {
            post_id: 10,
            user_id: 2,
            created_at: Utc::now(),
        };

        let err = projections
            .handle(&ctx(EventType::LikeCreated), event)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("likes_by_user"));
    }

    #[tokio::test]
    async fn test_comment_increments_comment_count() {
        let (projections, counters, _) = projections();
        let event = CommentCreated {
            comment_id: 77,
            post_id: 10,
            author_id: 3,
            content: "nice".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let ctx = ctx(EventType::CommentCreated);

        projections.handle(&ctx, event.clone()).await.unwrap();
        projections.handle(&ctx, event).await.unwrap();

        assert_eq!(counters.value(CounterKey::new(CounterKind::PostComments, 10)), 1);
    }
}
