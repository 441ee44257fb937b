//! PostgreSQL 连接

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use threads_errors::{AppError, AppResult};

/// 连接池参数
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

impl PoolSettings {
    pub fn with_max_connections(max_connections: u32) -> Self {
        Self {
            max_connections,
            ..Self::default()
        }
    }
}

/// 建立连接池并确认数据库可达
///
/// URL 无法解析时返回 `Config`（重试无意义），数据库不可达时返回 `Connection`。
pub async fn connect(url: &str, settings: &PoolSettings) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout)
        .idle_timeout(settings.idle_timeout)
        .connect_lazy(url)
        .map_err(|e| AppError::config(format!("Invalid database URL: {}", e)))?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| AppError::connection(format!("Database unreachable: {}", e)))?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_override_only_pool_size() {
        let settings = PoolSettings::with_max_connections(50);
        assert_eq!(settings.max_connections, 50);
        assert_eq!(settings.min_connections, 1);
        assert_eq!(settings.acquire_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_malformed_url_is_not_retryable() {
        let err = connect("not a database url", &PoolSettings::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Config(_)));
        assert!(!err.is_retryable());
    }
}
