//! comment-service - 评论
//!
//! - 写路径：发表评论
//! - 投影：按评论 ID 与按作者的评论索引

pub mod projections;
pub mod repository;

pub use projections::*;
pub use repository::*;
