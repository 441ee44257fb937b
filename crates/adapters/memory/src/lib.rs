//! threads-adapter-memory - 进程内适配器
//!
//! 所有端口的内存实现，支持故障注入，用于测试和本地运行

mod bus;
mod cache;
mod counters;
mod ids;
mod index;
mod storage;

pub use bus::*;
pub use cache::*;
pub use counters::*;
pub use ids::*;
pub use index::*;
pub use storage::*;
