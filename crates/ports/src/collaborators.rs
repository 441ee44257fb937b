//! 核心之外的协作者接口

use threads_errors::AppResult;

/// 唯一 ID 生成器
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> AppResult<i64>;
}

/// 当前请求的认证上下文
pub trait AuthContext: Send + Sync {
    /// 当前用户 ID，未认证时返回错误
    fn current_user(&self) -> AppResult<i64>;
}
