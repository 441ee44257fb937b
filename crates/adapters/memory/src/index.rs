//! 内存二级索引

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use threads_errors::{AppError, AppResult};
use threads_ports::{CommentRow, IndexPort, LikeByUser, PostByUser};

#[derive(Default)]
struct IndexState {
    posts_by_user: BTreeMap<(i64, i64), PostByUser>,
    likes_by_user: BTreeMap<(i64, i64), LikeByUser>,
    comments_by_id: BTreeMap<i64, CommentRow>,
    comments_by_author: BTreeMap<(i64, i64), CommentRow>,
    failing_upserts: usize,
}

/// 内存索引
#[derive(Clone, Default)]
pub struct InMemoryIndex {
    state: Arc<Mutex<IndexState>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接下来 n 次 upsert 失败，不区分表
    pub fn fail_next_upserts(&self, n: usize) {
        self.state.lock().failing_upserts = n;
    }

    pub fn posts_by_user(&self, user_id: i64) -> Vec<PostByUser> {
        self.state
            .lock()
            .posts_by_user
            .range((user_id, i64::MIN)..=(user_id, i64::MAX))
            .map(|(_, row)| row.clone())
            .collect()
    }

    pub fn likes_by_user(&self, user_id: i64) -> Vec<LikeByUser> {
        self.state
            .lock()
            .likes_by_user
            .range((user_id, i64::MIN)..=(user_id, i64::MAX))
            .map(|(_, row)| row.clone())
            .collect()
    }

    pub fn comment_by_id(&self, comment_id: i64) -> Option<CommentRow> {
        self.state.lock().comments_by_id.get(&comment_id).cloned()
    }

    pub fn comments_by_author(&self, author_id: i64) -> Vec<CommentRow> {
        self.state
            .lock()
            .comments_by_author
            .range((author_id, i64::MIN)..=(author_id, i64::MAX))
            .map(|(_, row)| row.clone())
            .collect()
    }

    fn check_failure(state: &mut IndexState, table: &str) -> AppResult<()> {
        if state.failing_upserts > 0 {
            state.failing_upserts -= 1;
            return Err(AppError::storage(format!("Injected upsert failure on {}", table)));
        }
        Ok(())
    }
}

#[async_trait]
impl IndexPort for InMemoryIndex {
    async fn upsert_post_by_user(&self, row: &PostByUser) -> AppResult<()> {
        let mut state = self.state.lock();
        Self::check_failure(&mut state, "posts_by_user")?;
        state
            .posts_by_user
            .insert((row.user_id, row.post_id), row.clone());
        Ok(())
    }

    async fn upsert_like_by_user(&self, row: &LikeByUser) -> AppResult<()> {
        let mut state = self.state.lock();
        Self::check_failure(&mut state, "likes_by_user")?;
        state
            .likes_by_user
            .insert((row.user_id, row.post_id), row.clone());
        Ok(())
    }

    async fn upsert_comment_by_id(&self, row: &CommentRow) -> AppResult<()> {
        let mut state = self.state.lock();
        Self::check_failure(&mut state, "comments_by_id")?;
        state.comments_by_id.insert(row.comment_id, row.clone());
        Ok(())
    }

    async fn upsert_comment_by_author(&self, row: &CommentRow) -> AppResult<()> {
        let mut state = self.state.lock();
        Self::check_failure(&mut state, "comments_by_author")?;
        state
            .comments_by_author
            .insert((row.author_id, row.comment_id), row.clone());
        Ok(())
    }
}
