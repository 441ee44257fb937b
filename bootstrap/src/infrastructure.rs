//! 基础设施资源管理
//!
//! 统一管理所有服务共享的基础设施资源

use std::sync::Arc;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use threads_adapter_kafka::{
    ConsumerConfig as KafkaConsumerConfig, KafkaBusConsumer, KafkaBusProducer, KafkaClientConfig,
    ProducerConfig, SaslConfig, SecurityProtocol,
};
use threads_adapter_postgres::{
    PoolSettings, PostgresCounters, PostgresIndex, PostgresStorage, run_migrations,
};
use threads_adapter_redis::RedisCache;
use threads_config::{AppConfig, KafkaConfig};
use threads_errors::{AppError, AppResult};
use threads_ports::CachePort;
use tracing::info;

use crate::retry::{RetryConfig, with_retry, with_retry_optional};

/// 基础设施资源容器
///
/// Postgres 是必需的，连接重试耗尽后启动失败；Redis 是可选的。
/// Kafka 客户端按需创建，避免不需要消费者的服务加入消费者组。
pub struct Infrastructure {
    config: AppConfig,
    postgres_pool: PgPool,
    redis_cache: Option<RedisCache>,
}

impl Infrastructure {
    /// 从配置创建基础设施资源（带重试）
    pub async fn from_config(config: AppConfig) -> AppResult<Self> {
        Self::from_config_with_retry(config, RetryConfig::default()).await
    }

    pub async fn from_config_with_retry(config: AppConfig, retry: RetryConfig) -> AppResult<Self> {
        // 1. PostgreSQL（必需）
        let database_url = config.database.url.expose_secret().clone();
        let settings = PoolSettings::with_max_connections(config.database.max_connections);
        let postgres_pool = with_retry(&retry, "PostgreSQL connection", || {
            threads_adapter_postgres::connect(&database_url, &settings)
        })
        .await?;
        info!(
            max_connections = config.database.max_connections,
            "PostgreSQL connection pool created"
        );

        // 2. 表结构
        run_migrations(&postgres_pool).await?;

        // 3. Redis（可选）
        let redis_cache = match &config.redis {
            Some(redis) => {
                let url = redis.url.expose_secret().clone();
                with_retry_optional(&retry, "Redis connection", || {
                    threads_adapter_redis::connect(&url)
                })
                .await
                .map(RedisCache::new)
            }
            None => {
                info!("Redis not configured, skipping");
                None
            }
        };

        Ok(Self {
            config,
            postgres_pool,
            redis_cache,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 存储会话与 outbox 表
    pub fn storage(&self) -> Arc<PostgresStorage> {
        Arc::new(PostgresStorage::new(self.postgres_pool.clone()))
    }

    pub fn counters(&self) -> Arc<PostgresCounters> {
        Arc::new(PostgresCounters::new(self.postgres_pool.clone()))
    }

    pub fn index(&self) -> Arc<PostgresIndex> {
        Arc::new(PostgresIndex::new(self.postgres_pool.clone()))
    }

    /// 需要缓存的服务调用；Redis 不可用时返回配置错误
    pub fn cache(&self) -> AppResult<Arc<dyn CachePort>> {
        self.redis_cache
            .clone()
            .map(|cache| Arc::new(cache) as Arc<dyn CachePort>)
            .ok_or_else(|| AppError::config("Redis is required but not available"))
    }

    pub fn kafka_producer(&self) -> AppResult<KafkaBusProducer> {
        let base = kafka_client_config(&self.config.kafka)?;
        KafkaBusProducer::new(&ProducerConfig::new(base))
    }

    /// 以配置中的 group_id 加入消费者组
    pub fn kafka_consumer(&self) -> AppResult<KafkaBusConsumer> {
        let base = kafka_client_config(&self.config.kafka)?;
        KafkaBusConsumer::new(&KafkaConsumerConfig::new(
            base,
            self.config.kafka.group_id.clone(),
        ))
    }
}

/// 把应用配置转换为 Kafka 客户端配置
///
/// 配置了用户名时启用 SASL PLAIN；SASL 协议缺少用户名视为配置错误。
pub fn kafka_client_config(config: &KafkaConfig) -> AppResult<KafkaClientConfig> {
    let protocol: SecurityProtocol = config.security_protocol.parse()?;

    let mut client = KafkaClientConfig::new(config.brokers.clone(), config.topic.clone())
        .with_client_id(config.client_id.clone())
        .with_security_protocol(protocol)
        .with_request_timeout(config.request_timeout());

    if let Some(username) = &config.username {
        let password = config
            .password
            .as_ref()
            .map(|p| p.expose_secret().clone())
            .unwrap_or_default();
        client = client.with_sasl(SaslConfig::plain(username.clone(), password));
    } else if protocol.uses_sasl() {
        return Err(AppError::config(format!(
            "Kafka security protocol {} requires a username",
            protocol.as_str()
        )));
    }

    Ok(client)
}
