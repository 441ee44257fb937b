//! Graceful Shutdown

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

/// 等待收尾任务完成，最多等待 `timeout`
///
/// 超时返回 false，未完成的任务随运行时一起被丢弃。
pub async fn drain_within<F>(timeout: Duration, task: F) -> bool
where
    F: Future<Output = ()>,
{
    match tokio::time::timeout(timeout, task).await {
        Ok(()) => {
            info!("All tasks drained");
            true
        }
        Err(_) => {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Shutdown timed out, abandoning remaining tasks"
            );
            false
        }
    }
}
