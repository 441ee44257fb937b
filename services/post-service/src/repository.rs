//! 帖子写路径

use std::sync::Arc;

use chrono::Utc;
use threads_errors::{AppError, AppResult};
use threads_event_core::{LikeCreated, PostCreated};
use threads_outbox::OutboxWriter;
use threads_ports::{AuthContext, IdGenerator, Statement};
use tracing::info;

const INSERT_POST: &str =
    "INSERT INTO posts (id, user_id, content, image_url, created_at) VALUES ($1, $2, $3, $4, $5)";
const INSERT_LIKE: &str = "INSERT INTO likes (post_id, user_id, created_at) VALUES ($1, $2, $3)";

/// 帖子内容上限（字符）
pub const MAX_CONTENT_CHARS: usize = 500;

/// 帖子仓储
pub struct PostRepository {
    writer: OutboxWriter,
    ids: Arc<dyn IdGenerator>,
    auth: Arc<dyn AuthContext>,
}

impl PostRepository {
    pub fn new(writer: OutboxWriter, ids: Arc<dyn IdGenerator>, auth: Arc<dyn AuthContext>) -> Self {
        Self { writer, ids, auth }
    }

    pub async fn create_post(
        &self,
        content: impl Into<String>,
        image_url: Option<String>,
    ) -> AppResult<PostCreated> {
        let user_id = self.auth.current_user()?;
        let content = content.into();
        if content.trim().is_empty() {
            return Err(AppError::validation("Post content must not be empty"));
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(AppError::validation(format!(
                "Post content exceeds {} characters",
                MAX_CONTENT_CHARS
            )));
        }

        let event = PostCreated {
            post_id: self.ids.next_id()?,
            user_id,
            content,
            image_url,
            created_at: Utc::now(),
        };

        let insert = Statement::new(INSERT_POST)
            .bind(event.post_id)
            .bind(user_id)
            .bind(event.content.as_str())
            .bind(event.image_url.clone())
            .bind(event.created_at);

        let event_id = self.writer.append(vec![insert], &event).await?;
        info!(post_id = event.post_id, user_id, event_id = %event_id, "Post created");
        Ok(event)
    }

    /// 重复点赞由 likes 主键拒绝，整个批次不生效
    pub async fn like_post(&self, post_id: i64) -> AppResult<LikeCreated> {
        let user_id = self.auth.current_user()?;

        let event = LikeCreated {
            post_id,
            user_id,
            created_at: Utc::now(),
        };

        let insert = Statement::new(INSERT_LIKE)
            .bind(post_id)
            .bind(user_id)
            .bind(event.created_at);

        let event_id = self.writer.append(vec![insert], &event).await?;
        info!(post_id, user_id, event_id = %event_id, "Post liked");
        Ok(event)
    }
}
