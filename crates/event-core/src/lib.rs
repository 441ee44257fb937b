//! threads-event-core - 事件核心库
//!
//! 事件类型标签、强类型事件负载、总线信封与 key 编解码

mod envelope;
mod event_type;
mod events;

pub use envelope::*;
pub use event_type::*;
pub use events::*;
