//! threads-projection - 反规范化投影消费者
//!
//! 从消息总线读取事件信封，按事件类型分发给强类型处理器，
//! 处理成功后才提交消费位置。

mod consumer;
mod effects;
mod janitor;
mod registry;

pub use consumer::*;
pub use effects::*;
pub use janitor::*;
pub use registry::*;
