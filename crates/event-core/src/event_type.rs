//! 事件类型标签

use std::fmt;
use std::str::FromStr;

use threads_errors::AppError;

/// 已知的事件类型
///
/// 标签一旦发布就不能复用于其他语义。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    UserCreated,
    UserFollowed,
    UserUnfollowed,
    PostCreated,
    LikeCreated,
    CommentCreated,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        Self::UserCreated,
        Self::UserFollowed,
        Self::UserUnfollowed,
        Self::PostCreated,
        Self::LikeCreated,
        Self::CommentCreated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserCreated => "user.created",
            Self::UserFollowed => "user.followed",
            Self::UserUnfollowed => "user.unfollowed",
            Self::PostCreated => "post.created",
            Self::LikeCreated => "like.created",
            Self::CommentCreated => "comment.created",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AppError::unknown_event_type(s))
    }
}
