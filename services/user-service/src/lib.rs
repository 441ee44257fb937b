//! user-service - 用户与关注关系
//!
//! - 写路径：创建用户、关注、取消关注，领域变更与事件同批写入
//! - 投影：维护粉丝/关注计数和关注关系缓存

pub mod projections;
pub mod repository;

pub use projections::*;
pub use repository::*;
