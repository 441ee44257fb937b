//! 副作用账本清理
//!
//! 同一事件的重复投递只会发生在 outbox 保留期加总线保留期之内，
//! 超过这个窗口的账本记录不再需要。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use threads_errors::{AppError, AppResult};
use threads_ports::CounterPort;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 账本清理任务
pub struct LedgerJanitor {
    counters: Arc<dyn CounterPort>,
    retention: chrono::Duration,
    interval: Duration,
}

impl LedgerJanitor {
    pub fn new(
        counters: Arc<dyn CounterPort>,
        retention: Duration,
        interval: Duration,
    ) -> AppResult<Self> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|e| AppError::config(format!("Invalid ledger retention: {}", e)))?;
        Ok(Self {
            counters,
            retention,
            interval,
        })
    }

    /// 删除超过保留期的账本记录
    pub async fn purge_once(&self) -> AppResult<u64> {
        let cutoff = Utc::now() - self.retention;
        let purged = self.counters.purge_effects(cutoff).await?;
        if purged > 0 {
            info!(purged, cutoff = %cutoff, "Purged effect ledger entries");
        }
        counter!("projection_ledger_purged_total").increment(purged);
        Ok(purged)
    }

    /// 按间隔清理，直到 `shutdown` 被取消
    pub async fn run(&self, shutdown: CancellationToken) {
        debug!(interval_secs = self.interval.as_secs(), "Ledger janitor started");
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.purge_once().await {
                        error!(error = %e, "Failed to purge effect ledger");
                    }
                }
                _ = shutdown.cancelled() => {
                    break;
                }
            }
        }
        debug!("Ledger janitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threads_adapter_memory::InMemoryCounters;
    use threads_ports::{CounterKey, CounterKind, EffectKey};
    use uuid::Uuid;

    async fn record_effect(counters: &InMemoryCounters) {
        counters
            .apply_once(
                &EffectKey::new(Uuid::now_v7(), "like_count"),
                CounterKey::new(CounterKind::PostLikes, 1),
                1,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_recent_entries_are_kept() {
        let counters = InMemoryCounters::new();
        record_effect(&counters).await;
        let janitor = LedgerJanitor::new(
            Arc::new(counters.clone()),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        )
        .unwrap();

        assert_eq!(janitor.purge_once().await.unwrap(), 0);
        assert_eq!(counters.applied_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_purged() {
        let counters = InMemoryCounters::new();
        record_effect(&counters).await;
        record_effect(&counters).await;
        let janitor =
            LedgerJanitor::new(Arc::new(counters.clone()), Duration::ZERO, Duration::from_secs(60))
                .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(janitor.purge_once().await.unwrap(), 2);
        assert_eq!(counters.applied_count(), 0);
        assert_eq!(counters.value(CounterKey::new(CounterKind::PostLikes, 1)), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_purges_until_cancelled() {
        let counters = InMemoryCounters::new();
        record_effect(&counters).await;
        let janitor = Arc::new(
            LedgerJanitor::new(
                Arc::new(counters.clone()),
                Duration::ZERO,
                Duration::from_secs(60),
            )
            .unwrap(),
        );
        let shutdown = CancellationToken::new();
        let task = tokio::spawn({
            let janitor = janitor.clone();
            let shutdown = shutdown.clone();
            async move { janitor.run(shutdown).await }
        });

        tokio::time::sleep(Duration::from_secs(150)).await;
        shutdown.cancel();
        task.await.unwrap();

        assert_eq!(counters.applied_count(), 0);
    }
}
