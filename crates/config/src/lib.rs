//! threads-config - 配置加载库

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use secrecy::Secret;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    match std::env::var("APP_ENV").as_deref() {
        Ok("production") => 50,
        _ => 10,
    }
}

/// Redis 配置
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Secret<String>,
}

/// Kafka 配置
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// SASL PLAIN 用户名，为空时不启用 SASL
    pub username: Option<String>,
    pub password: Option<Secret<String>>,
    #[serde(default = "default_security_protocol")]
    pub security_protocol: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_client_id() -> String {
    "threads".to_string()
}

fn default_security_protocol() -> String {
    "plaintext".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl KafkaConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Outbox relay 配置
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// outbox 记录保留时长（秒）
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

fn default_workers() -> usize {
    3
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_batch_size() -> usize {
    10
}

fn default_retention_secs() -> u64 {
    86_400
}

fn default_purge_interval_secs() -> u64 {
    3_600
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            retention_secs: default_retention_secs(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

impl RelayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}

/// 投影消费者配置
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    #[serde(default = "default_read_error_backoff_ms")]
    pub read_error_backoff_ms: u64,
    /// 副作用账本保留时长（秒），须覆盖 outbox 保留期与总线保留期之和
    #[serde(default = "default_ledger_retention_secs")]
    pub ledger_retention_secs: u64,
    #[serde(default = "default_ledger_purge_interval_secs")]
    pub ledger_purge_interval_secs: u64,
}

fn default_read_error_backoff_ms() -> u64 {
    1_000
}

fn default_ledger_retention_secs() -> u64 {
    // 1 天 outbox + 7 天 Kafka 默认保留
    8 * 86_400
}

fn default_ledger_purge_interval_secs() -> u64 {
    3_600
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            read_error_backoff_ms: default_read_error_backoff_ms(),
            ledger_retention_secs: default_ledger_retention_secs(),
            ledger_purge_interval_secs: default_ledger_purge_interval_secs(),
        }
    }
}

impl ConsumerConfig {
    pub fn read_error_backoff(&self) -> Duration {
        Duration::from_millis(self.read_error_backoff_ms)
    }

    pub fn ledger_retention(&self) -> Duration {
        Duration::from_secs(self.ledger_retention_secs)
    }

    pub fn ledger_purge_interval(&self) -> Duration {
        Duration::from_secs(self.ledger_purge_interval_secs)
    }
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 为 None 时生产环境使用 JSON 输出
    pub json: Option<bool>,
    /// Prometheus 抓取端口，未配置时只安装 recorder
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: None,
            metrics_port: None,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    pub app_env: String,
    pub database: DatabaseConfig,
    pub redis: Option<RedisConfig>,
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let config: Self = Self::figment(config_dir, &env).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// 检查无法由类型表达的约束
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.workers == 0 {
            return Err(ConfigError::Invalid("relay.workers must be at least 1".into()));
        }
        if self.relay.batch_size == 0 {
            return Err(ConfigError::Invalid("relay.batch_size must be at least 1".into()));
        }
        if self.relay.poll_interval_ms == 0 || self.relay.purge_interval_secs == 0 {
            return Err(ConfigError::Invalid("relay intervals must be non-zero".into()));
        }
        if self.consumer.ledger_purge_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "consumer.ledger_purge_interval_secs must be non-zero".into(),
            ));
        }
        if self.consumer.ledger_retention_secs <= self.relay.retention_secs {
            return Err(ConfigError::Invalid(format!(
                "consumer.ledger_retention_secs ({}) must exceed relay.retention_secs ({})",
                self.consumer.ledger_retention_secs, self.relay.retention_secs
            )));
        }
        Ok(())
    }

    /// 配置来源：default.toml < {env}.toml < THREADS_ 环境变量
    pub fn figment(config_dir: &str, env: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("THREADS_").split("__"))
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否使用 JSON 日志
    pub fn json_logs(&self) -> bool {
        self.telemetry.json.unwrap_or_else(|| self.is_production())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests;
