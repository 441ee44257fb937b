//! ID 生成与认证上下文

use std::sync::atomic::{AtomicI64, Ordering};

use threads_errors::{AppError, AppResult};
use threads_ports::{AuthContext, IdGenerator};

/// 单调递增的 ID 序列
#[derive(Debug)]
pub struct SequenceIdGenerator {
    next: AtomicI64,
}

impl SequenceIdGenerator {
    pub fn starting_at(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }
}

impl Default for SequenceIdGenerator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn next_id(&self) -> AppResult<i64> {
        Ok(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// 固定用户的认证上下文，None 表示未认证
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedAuthContext(pub Option<i64>);

impl FixedAuthContext {
    pub fn user(user_id: i64) -> Self {
        Self(Some(user_id))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl AuthContext for FixedAuthContext {
    fn current_user(&self) -> AppResult<i64> {
        self.0
            .ok_or_else(|| AppError::validation("Request is not authenticated"))
    }
}
