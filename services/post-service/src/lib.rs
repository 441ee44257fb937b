//! post-service - 帖子与点赞
//!
//! - 写路径：发帖、点赞
//! - 投影：用户帖子索引、用户点赞索引、帖子互动计数

pub mod projections;
pub mod repository;

pub use projections::*;
pub use repository::*;
