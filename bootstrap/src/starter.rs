//! 服务启动器
//!
//! 两种服务形态：outbox relay（processor-service）与投影消费者（其余服务）

use std::sync::Arc;

use threads_config::{AppConfig, RelayConfig};
use threads_errors::AppResult;
use threads_outbox::{OutboxRelay, WorkerPool, WorkerPoolConfig};
use threads_projection::{HandlerRegistry, LedgerJanitor, ProjectionConsumer};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::infrastructure::Infrastructure;
use crate::runtime::{init_runtime, shutdown_signal};
use crate::shutdown::drain_within;

type BoxError = Box<dyn std::error::Error>;

/// 加载配置、初始化运行时并连接基础设施
async fn prepare(config_dir: &str) -> Result<Infrastructure, BoxError> {
    // 本地开发时 .env 中的 THREADS_ 变量参与配置覆盖
    dotenvy::dotenv().ok();
    let config = AppConfig::load(config_dir)?;
    init_runtime(&config)?;

    info!("Starting {} service", config.app_name);

    Ok(Infrastructure::from_config(config).await?)
}

pub fn worker_pool_config(relay: &RelayConfig) -> WorkerPoolConfig {
    WorkerPoolConfig {
        workers: relay.workers,
        poll_interval: relay.poll_interval(),
        batch_size: relay.batch_size,
        purge_interval: relay.purge_interval(),
    }
}

/// 运行 outbox relay
///
/// 收到关闭信号后取消所有 worker，等待当前批次结束，最后刷新生产者缓冲。
pub async fn run_relay(config_dir: &str) -> Result<(), BoxError> {
    let infra = prepare(config_dir).await?;
    let config = infra.config().clone();

    let producer = Arc::new(infra.kafka_producer()?);
    let relay = Arc::new(OutboxRelay::new(infra.storage(), producer.clone()));

    let shutdown = CancellationToken::new();
    let pool = WorkerPool::start(worker_pool_config(&config.relay), relay, &shutdown);

    shutdown_signal().await;
    shutdown.cancel();

    drain_within(config.shutdown_timeout(), pool.join()).await;
    producer.flush(config.shutdown_timeout());

    info!("Service stopped");
    Ok(())
}

/// 运行投影消费者和副作用账本清理任务
///
/// `build_registry` 用基础设施构造本服务的处理器表，
/// 缺少必需处理器时在这里失败，不会加入消费者组。
pub async fn run_projection<F>(config_dir: &str, build_registry: F) -> Result<(), BoxError>
where
    F: FnOnce(&Infrastructure) -> AppResult<HandlerRegistry>,
{
    let infra = prepare(config_dir).await?;
    let config = infra.config().clone();

    let registry = Arc::new(build_registry(&infra)?);
    let consumer = Arc::new(ProjectionConsumer::new(
        Arc::new(infra.kafka_consumer()?),
        registry,
        config.consumer.read_error_backoff(),
    ));
    let janitor = Arc::new(LedgerJanitor::new(
        infra.counters(),
        config.consumer.ledger_retention(),
        config.consumer.ledger_purge_interval(),
    )?);

    let shutdown = CancellationToken::new();
    let tasks = vec![
        tokio::spawn({
            let consumer = consumer.clone();
            let shutdown = shutdown.clone();
            async move { consumer.run(shutdown).await }
        }),
        tokio::spawn({
            let janitor = janitor.clone();
            let shutdown = shutdown.clone();
            async move { janitor.run(shutdown).await }
        }),
    ];

    shutdown_signal().await;
    shutdown.cancel();

    drain_within(config.shutdown_timeout(), async {
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Projection task terminated abnormally");
            }
        }
    })
    .await;

    info!("Service stopped");
    Ok(())
}
