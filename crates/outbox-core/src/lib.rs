//! threads-outbox - 事务性 outbox
//!
//! - `OutboxWriter`：领域变更与 outbox 记录在同一原子批次中写入
//! - `OutboxRelay`：把未发布记录推送到消息总线并标记为已发布
//! - `WorkerPool`：多个独立定时 worker 驱动 relay，支持优雅关闭

mod pool;
mod relay;
mod writer;

pub use pool::*;
pub use relay::*;
pub use writer::*;
