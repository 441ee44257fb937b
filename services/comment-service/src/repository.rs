//! 评论写路径

use std::sync::Arc;

use chrono::Utc;
use threads_errors::{AppError, AppResult};
use threads_event_core::CommentCreated;
use threads_outbox::OutboxWriter;
use threads_ports::{AuthContext, IdGenerator, Statement};
use tracing::info;

const INSERT_COMMENT: &str = "INSERT INTO comments (id, post_id, author_id, content, created_at, updated_at) \
     VALUES ($1, $2, $3, $4, $5, $6)";

/// 评论仓储
pub struct CommentRepository {
    writer: OutboxWriter,
    ids: Arc<dyn IdGenerator>,
    auth: Arc<dyn AuthContext>,
}

impl CommentRepository {
    pub fn new(writer: OutboxWriter, ids: Arc<dyn IdGenerator>, auth: Arc<dyn AuthContext>) -> Self {
        Self { writer, ids, auth }
    }

    /// 当前用户在 `post_id` 下发表评论
    pub async fn create_comment(
        &self,
        post_id: i64,
        content: impl Into<String>,
    ) -> AppResult<CommentCreated> {
        let author_id = self.auth.current_user()?;
        let content = content.into();
        if content.trim().is_empty() {
            return Err(AppError::validation("Comment content must not be empty"));
        }

        let now = Utc::now();
        let event = CommentCreated {
            comment_id: self.ids.next_id()?,
            post_id,
            author_id,
            content,
            created_at: now,
            updated_at: now,
        };

        let insert = Statement::new(INSERT_COMMENT)
            .bind(event.comment_id)
            .bind(post_id)
            .bind(author_id)
            .bind(event.content.as_str())
            .bind(event.created_at)
            .bind(event.updated_at);

        let event_id = self.writer.append(vec![insert], &event).await?;
        info!(
            comment_id = event.comment_id,
            post_id,
            author_id,
            event_id = %event_id,
            "Comment created"
        );
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use threads_adapter_memory::{FixedAuthContext, InMemoryStorage, SequenceIdGenerator};

    fn repository(storage: &InMemoryStorage, auth: FixedAuthContext) -> CommentRepository {
        let writer =
            OutboxWriter::new(Arc::new(storage.clone()), Duration::from_secs(86_400)).unwrap();
        CommentRepository::new(writer, Arc::new(SequenceIdGenerator::starting_at(9)), Arc::new(auth))
    }

    #[tokio::test]
    async fn test_comment_routes_by_post() {
        let storage = InMemoryStorage::new();
        let repo = repository(&storage, FixedAuthContext::user(4));

        let comment = repo.create_comment(10, "first!").await.unwrap();

        assert_eq!(comment.comment_id, 9);
        assert_eq!(comment.author_id, 4);
        assert_eq!(comment.created_at, comment.updated_at);
        assert_eq!(storage.mutations()[0].params.len(), 6);
        let record = &storage.outbox_records()[0];
        assert_eq!(record.event_type, "comment.created");
        assert_eq!(record.routing_hint, "10");
    }

    #[tokio::test]
    async fn test_empty_comment_is_rejected() {
        let storage = InMemoryStorage::new();
        let repo = repository(&storage, FixedAuthContext::user(4));

        let err = repo.create_comment(10, "  ").await.unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(storage.outbox_records().is_empty());
    }
}
