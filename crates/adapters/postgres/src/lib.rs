//! threads-adapter-postgres - PostgreSQL 适配器
//!
//! 存储会话、outbox 表、计数器与二级索引的 sqlx 实现

mod connection;
mod counters;
mod index;
mod migration;
mod storage;

pub use connection::*;
pub use counters::*;
pub use index::*;
pub use migration::*;
pub use storage::*;
