//! 评论事件投影

use std::sync::Arc;

use async_trait::async_trait;
use threads_errors::AppResult;
use threads_event_core::{CommentCreated, EventType};
use threads_ports::{CommentRow, IndexPort};
use threads_projection::{EffectGroup, EventContext, EventHandler, HandlerRegistry, RegistryBuilder};

pub fn required_event_types() -> &'static [EventType] {
    &[EventType::CommentCreated]
}

/// 两张评论索引表的投影，两次 upsert 都幂等
pub struct CommentProjections {
    index: Arc<dyn IndexPort>,
}

impl CommentProjections {
    pub fn new(index: Arc<dyn IndexPort>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl EventHandler<CommentCreated> for CommentProjections {
    async fn handle(&self, _ctx: &EventContext, event: CommentCreated) -> AppResult<()> {
        let row = CommentRow {
            comment_id: event.comment_id,
            post_id: event.post_id,
            author_id: event.author_id,
            content: event.content,
            created_at: event.created_at,
            updated_at: event.updated_at,
        };

        EffectGroup::new()
            .with("comments_by_id", self.index.upsert_comment_by_id(&row))
            .with("comments_by_author", self.index.upsert_comment_by_author(&row))
            .join()
            .await
    }
}

pub fn build_registry(projections: CommentProjections) -> AppResult<HandlerRegistry> {
    RegistryBuilder::new()
        .register::<CommentCreated, _>(projections)
        .build(required_event_types())
}
