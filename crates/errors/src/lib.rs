//! threads-errors - 统一错误处理
//!
//! outbox、消息总线与投影消费者共用的错误分类

use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 原子批次或读写失败
    #[error("Storage error: {0}")]
    Storage(String),

    /// 消息总线不可达或拒绝写入
    #[error("Publish error: {0}")]
    Publish(String),

    /// 下游副作用失败（可能部分完成）
    #[error("Handler error in {effect}: {cause}")]
    Handler { effect: String, cause: String },

    /// 没有注册对应的事件处理器
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// 信封或负载编解码失败
    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    pub fn handler(effect: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Handler {
            effect: effect.into(),
            cause: cause.into(),
        }
    }

    pub fn unknown_event_type(event_type: impl Into<String>) -> Self {
        Self::UnknownEventType(event_type.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 是否为瞬时错误（重新投递或下一轮轮询可能成功）
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Publish(_) | Self::Handler { .. } | Self::Connection(_)
        )
    }

    /// 指标标签
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Storage(_) => "storage",
            Self::Publish(_) => "publish",
            Self::Handler { .. } => "handler",
            Self::UnknownEventType(_) => "unknown_event_type",
            Self::Codec(_) => "codec",
            Self::Config(_) => "config",
            Self::Connection(_) => "connection",
            Self::Validation(_) => "validation",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::storage("timeout").is_retryable());
        assert!(AppError::publish("broker down").is_retryable());
        assert!(AppError::handler("follower_count", "boom").is_retryable());
        assert!(!AppError::unknown_event_type("post.deleted").is_retryable());
        assert!(!AppError::codec("bad json").is_retryable());
        assert!(!AppError::config("missing handler").is_retryable());
    }

    #[test]
    fn test_handler_display() {
        let err = AppError::handler("following_count", "connection reset");
        assert_eq!(
            err.to_string(),
            "Handler error in following_count: connection reset"
        );
        assert_eq!(err.kind(), "handler");
    }
}
