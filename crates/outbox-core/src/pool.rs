//! Relay worker 池

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};

use crate::OutboxRelay;

/// Worker 池配置
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// 并发 worker 数，配置加载时保证至少为 1
    pub workers: usize,
    /// 每个 worker 的轮询间隔
    pub poll_interval: Duration,
    /// 每轮最多处理的记录数
    pub batch_size: usize,
    /// 过期记录清理间隔
    pub purge_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            purge_interval: Duration::from_secs(3600),
        }
    }
}

/// Relay worker 池
///
/// 每个 worker 有独立的定时器，彼此之间没有锁或租约，
/// 并发 worker 可能选中同一条记录而重复发布。
/// 另有一个清理任务定期删除已发布且过期的记录。
pub struct WorkerPool {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// 启动 worker
    ///
    /// 池使用 `shutdown` 的子 token：父 token 取消时池随之停止，
    /// `stop()` 只停止本池。
    pub fn start(
        config: WorkerPoolConfig,
        relay: Arc<OutboxRelay>,
        shutdown: &CancellationToken,
    ) -> Self {
        let shutdown = shutdown.child_token();
        let workers = config.workers;
        let mut handles = Vec::with_capacity(workers + 1);

        for worker_id in 0..workers {
            let span = info_span!("relay_worker", worker_id);
            handles.push(tokio::spawn(
                run_worker(
                    relay.clone(),
                    config.poll_interval,
                    config.batch_size,
                    shutdown.clone(),
                )
                .instrument(span),
            ));
        }

        handles.push(tokio::spawn(
            run_janitor(relay, config.purge_interval, shutdown.clone())
                .instrument(info_span!("outbox_janitor")),
        ));

        info!(
            workers,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            batch_size = config.batch_size,
            "Outbox relay pool started"
        );

        Self { shutdown, handles }
    }

    /// 是否仍有任务在运行
    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }

    /// 取消并等待所有 worker 退出
    pub async fn stop(self) {
        self.shutdown.cancel();
        self.join().await;
    }

    /// 等待所有 worker 退出，不主动取消
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Outbox relay task terminated abnormally");
            }
        }
        info!("Outbox relay pool stopped");
    }
}

async fn run_worker(
    relay: Arc<OutboxRelay>,
    poll_interval: Duration,
    batch_size: usize,
    shutdown: CancellationToken,
) {
    debug!("Relay worker started");
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // 已开始的轮询会执行完毕
                if let Err(e) = relay.poll_batch(batch_size).await {
                    error!(error = %e, "Failed to poll outbox");
                }
            }
            _ = shutdown.cancelled() => {
                break;
            }
        }
    }
    debug!("Relay worker stopped");
}

async fn run_janitor(relay: Arc<OutboxRelay>, purge_interval: Duration, shutdown: CancellationToken) {
    let mut ticker = interval(purge_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = relay.purge_expired().await {
                    error!(error = %e, "Failed to purge expired outbox records");
                }
            }
            _ = shutdown.cancelled() => {
                break;
            }
        }
    }
}
