//! PostgreSQL 二级索引

use async_trait::async_trait;
use sqlx::PgPool;
use threads_errors::{AppError, AppResult};
use threads_ports::{CommentRow, IndexPort, LikeByUser, PostByUser};

/// PostgreSQL 索引表
#[derive(Clone)]
pub struct PostgresIndex {
    pool: PgPool,
}

impl PostgresIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IndexPort for PostgresIndex {
    async fn upsert_post_by_user(&self, row: &PostByUser) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO posts_by_user (user_id, post_id, content, image_url, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, post_id) DO UPDATE
            SET content = EXCLUDED.content,
                image_url = EXCLUDED.image_url,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(row.user_id)
        .bind(row.post_id)
        .bind(&row.content)
        .bind(row.image_url.as_deref())
        .bind(row.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::storage(format!("Failed to upsert posts_by_user: {}", e)))?;

        Ok(())
    }

    async fn upsert_like_by_user(&self, row: &LikeByUser) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO likes_by_user (user_id, post_id, liked_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, post_id) DO UPDATE
            SET liked_at = EXCLUDED.liked_at
            "#,
        )
        .bind(row.user_id)
        .bind(row.post_id)
        .bind(row.liked_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::storage(format!("Failed to upsert likes_by_user: {}", e)))?;

        Ok(())
    }

    async fn upsert_comment_by_id(&self, row: &CommentRow) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO comments_by_id (comment_id, post_id, author_id, content, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (comment_id) DO UPDATE
            SET content = EXCLUDED.content,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(row.comment_id)
        .bind(row.post_id)
        .bind(row.author_id)
        .bind(&row.content)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::storage(format!("Failed to upsert comments_by_id: {}", e)))?;

        Ok(())
    }

    async fn upsert_comment_by_author(&self, row: &CommentRow) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO comments_by_author (author_id, comment_id, post_id, content, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (author_id, comment_id) DO UPDATE
            SET content = EXCLUDED.content,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(row.author_id)
        .bind(row.comment_id)
        .bind(row.post_id)
        .bind(&row.content)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::storage(format!("Failed to upsert comments_by_author: {}", e)))?;

        Ok(())
    }
}
