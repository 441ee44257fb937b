//! ports - 抽象 trait 层
//!
//! 定义 outbox 核心依赖的所有外部协作者接口

mod bus;
mod cache;
mod collaborators;
mod outbox;
mod projection;
mod storage;

pub use bus::*;
pub use cache::*;
pub use collaborators::*;
pub use outbox::*;
pub use projection::*;
pub use storage::*;
