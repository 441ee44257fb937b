//! Kafka 配置模块

use std::str::FromStr;
use std::time::Duration;

use threads_errors::AppError;

/// Kafka 安全协议
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SecurityProtocol {
    #[default]
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl SecurityProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityProtocol::Plaintext => "plaintext",
            SecurityProtocol::Ssl => "ssl",
            SecurityProtocol::SaslPlaintext => "sasl_plaintext",
            SecurityProtocol::SaslSsl => "sasl_ssl",
        }
    }

    pub fn uses_sasl(&self) -> bool {
        matches!(self, Self::SaslPlaintext | Self::SaslSsl)
    }
}

impl FromStr for SecurityProtocol {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plaintext" => Ok(Self::Plaintext),
            "ssl" => Ok(Self::Ssl),
            "sasl_plaintext" => Ok(Self::SaslPlaintext),
            "sasl_ssl" => Ok(Self::SaslSsl),
            other => Err(AppError::config(format!(
                "Unsupported Kafka security protocol: {}",
                other
            ))),
        }
    }
}

/// SASL 认证机制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
}

impl SaslMechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
            SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

/// SASL 配置
#[derive(Clone)]
pub struct SaslConfig {
    pub mechanism: SaslMechanism,
    pub username: String,
    pub password: String,
}

impl SaslConfig {
    pub fn plain(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            mechanism: SaslMechanism::Plain,
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for SaslConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaslConfig")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// 生产者与消费者共用的客户端配置
#[derive(Debug, Clone)]
pub struct KafkaClientConfig {
    pub brokers: String,
    pub topic: String,
    pub client_id: Option<String>,
    pub security_protocol: SecurityProtocol,
    pub sasl: Option<SaslConfig>,
    pub request_timeout: Duration,
}

impl KafkaClientConfig {
    pub fn new(brokers: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            topic: topic.into(),
            client_id: None,
            security_protocol: SecurityProtocol::default(),
            sasl: None,
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_security_protocol(mut self, protocol: SecurityProtocol) -> Self {
        self.security_protocol = protocol;
        self
    }

    pub fn with_sasl(mut self, sasl: SaslConfig) -> Self {
        self.sasl = Some(sasl);
        if matches!(self.security_protocol, SecurityProtocol::Plaintext) {
            self.security_protocol = SecurityProtocol::SaslPlaintext;
        }
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// 转换为 rdkafka ClientConfig 的配置项
    pub fn to_client_config_entries(&self) -> Vec<(String, String)> {
        let mut entries = vec![
            ("bootstrap.servers".to_string(), self.brokers.clone()),
            (
                "security.protocol".to_string(),
                self.security_protocol.as_str().to_string(),
            ),
        ];

        if let Some(client_id) = &self.client_id {
            entries.push(("client.id".to_string(), client_id.clone()));
        }

        if let Some(sasl) = &self.sasl {
            entries.push((
                "sasl.mechanism".to_string(),
                sasl.mechanism.as_str().to_string(),
            ));
            entries.push(("sasl.username".to_string(), sasl.username.clone()));
            entries.push(("sasl.password".to_string(), sasl.password.clone()));
        }

        entries
    }
}

/// Producer 配置
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub base: KafkaClientConfig,
    /// 批量发送的等待时间
    pub linger_ms: u64,
    pub retries: u32,
}

impl ProducerConfig {
    pub fn new(base: KafkaClientConfig) -> Self {
        Self {
            base,
            linger_ms: 5,
            retries: 3,
        }
    }

    /// 转换为 rdkafka ClientConfig 的配置项
    ///
    /// acks 固定为 all：所有同步副本确认后才算写入成功。
    pub fn to_client_config_entries(&self) -> Vec<(String, String)> {
        let mut entries = self.base.to_client_config_entries();

        entries.push(("acks".to_string(), "all".to_string()));
        entries.push(("linger.ms".to_string(), self.linger_ms.to_string()));
        entries.push(("retries".to_string(), self.retries.to_string()));
        entries.push((
            "request.timeout.ms".to_string(),
            self.base.request_timeout.as_millis().to_string(),
        ));

        entries
    }
}

/// 自动偏移重置策略
#[derive(Debug, Clone, Copy, Default)]
pub enum AutoOffsetReset {
    #[default]
    Earliest,
    Latest,
}

impl AutoOffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoOffsetReset::Earliest => "earliest",
            AutoOffsetReset::Latest => "latest",
        }
    }
}

/// Consumer 配置
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub base: KafkaClientConfig,
    pub group_id: String,
    pub auto_offset_reset: AutoOffsetReset,
    pub session_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl ConsumerConfig {
    pub fn new(base: KafkaClientConfig, group_id: impl Into<String>) -> Self {
        Self {
            base,
            group_id: group_id.into(),
            auto_offset_reset: AutoOffsetReset::default(),
            session_timeout: Duration::from_secs(45),
            heartbeat_interval: Duration::from_secs(3),
        }
    }

    /// 转换为 rdkafka ClientConfig 的配置项
    ///
    /// 自动提交总是关闭。
    pub fn to_client_config_entries(&self) -> Vec<(String, String)> {
        let mut entries = self.base.to_client_config_entries();

        entries.push(("group.id".to_string(), self.group_id.clone()));
        entries.push(("enable.auto.commit".to_string(), "false".to_string()));
        entries.push((
            "auto.offset.reset".to_string(),
            self.auto_offset_reset.as_str().to_string(),
        ));
        entries.push((
            "session.timeout.ms".to_string(),
            self.session_timeout.as_millis().to_string(),
        ));
        entries.push((
            "heartbeat.interval.ms".to_string(),
            self.heartbeat_interval.as_millis().to_string(),
        ));

        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has(entries: &[(String, String)], key: &str, value: &str) -> bool {
        entries.iter().any(|(k, v)| k == key && v == value)
    }

    #[test]
    fn test_sasl_switches_protocol() {
        let config = KafkaClientConfig::new("localhost:9092", "threads-events")
            .with_client_id("processor-service")
            .with_sasl(SaslConfig::plain("user", "pass"));

        let entries = config.to_client_config_entries();
        assert!(has(&entries, "bootstrap.servers", "localhost:9092"));
        assert!(has(&entries, "security.protocol", "sasl_plaintext"));
        assert!(has(&entries, "sasl.mechanism", "PLAIN"));
        assert!(format!("{:?}", config).contains("[REDACTED]"));
    }

    #[test]
    fn test_producer_waits_for_all_replicas() {
        let config = ProducerConfig::new(
            KafkaClientConfig::new("localhost:9092", "threads-events")
                .with_request_timeout(Duration::from_millis(10_000)),
        );

        let entries = config.to_client_config_entries();
        assert!(has(&entries, "acks", "all"));
        assert!(has(&entries, "request.timeout.ms", "10000"));
    }

    #[test]
    fn test_consumer_disables_auto_commit() {
        let config = ConsumerConfig::new(
            KafkaClientConfig::new("localhost:9092", "threads-events"),
            "post-service",
        );

        let entries = config.to_client_config_entries();
        assert!(has(&entries, "group.id", "post-service"));
        assert!(has(&entries, "enable.auto.commit", "false"));
        assert!(has(&entries, "auto.offset.reset", "earliest"));
    }

    #[test]
    fn test_parse_security_protocol() {
        assert_eq!("SASL_SSL".parse::<SecurityProtocol>().unwrap(), SecurityProtocol::SaslSsl);
        assert!("kerberos".parse::<SecurityProtocol>().is_err());
    }
}
