//! threads-bootstrap - 统一服务启动骨架
//!
//! 所有服务复用的启动逻辑

mod infrastructure;
mod retry;
mod runtime;
mod shutdown;
mod starter;

pub use infrastructure::*;
pub use retry::*;
pub use runtime::*;
pub use shutdown::*;
pub use starter::*;
