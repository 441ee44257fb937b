//! 服务运行时

use threads_config::AppConfig;
use threads_errors::AppResult;
use threads_telemetry::{init_metrics, init_metrics_exporter, init_tracing, init_tracing_json};
use tracing::{error, info};

/// 初始化日志与 metrics
pub fn init_runtime(config: &AppConfig) -> AppResult<()> {
    if config.json_logs() {
        init_tracing_json(&config.telemetry.log_level);
    } else {
        init_tracing(&config.telemetry.log_level);
    }

    match config.telemetry.metrics_port {
        Some(port) => {
            init_metrics_exporter(port)?;
            info!(port, "Prometheus exporter listening");
        }
        None => {
            init_metrics()?;
        }
    }

    info!(
        app_name = %config.app_name,
        app_env = %config.app_env,
        "Runtime initialized"
    );
    Ok(())
}

/// 等待 SIGINT 或 SIGTERM
///
/// 某个信号处理器安装失败时只等待另一个。
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
