//! 投影消费者循环

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use threads_errors::AppResult;
use threads_event_core::{EventEnvelope, MessageKey};
use threads_ports::{BusConsumer, BusMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::registry::HandlerFailure;
use crate::{EventContext, HandlerRegistry};

/// 跳过消息的原因，全部不可重试
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// key 缺失或不是 `<event_type>:<routing_hint>` 格式
    MalformedKey,
    UnknownEventType,
    /// 已知类型，但本服务没有注册处理器
    Unhandled,
    /// 信封或负载无法解码
    Undecodable,
}

/// 单条消息的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    Skipped(SkipReason),
    /// 处理器失败，不提交
    Failed,
}

impl DispatchOutcome {
    /// 是否应提交消费位置
    pub fn should_commit(&self) -> bool {
        !matches!(self, Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handled => "handled",
            Self::Skipped(SkipReason::MalformedKey) => "malformed_key",
            Self::Skipped(SkipReason::UnknownEventType) => "unknown_event_type",
            Self::Skipped(SkipReason::Unhandled) => "unhandled",
            Self::Skipped(SkipReason::Undecodable) => "undecodable",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 投影消费者
///
/// 顺序读取消息并分发。处理器失败时不提交，继续处理下一条，
/// 该消息由之后从已提交位置恢复的消费者重新投递。
pub struct ProjectionConsumer {
    consumer: Arc<dyn BusConsumer>,
    registry: Arc<HandlerRegistry>,
    read_error_backoff: Duration,
}

impl ProjectionConsumer {
    pub fn new(
        consumer: Arc<dyn BusConsumer>,
        registry: Arc<HandlerRegistry>,
        read_error_backoff: Duration,
    ) -> Self {
        Self {
            consumer,
            registry,
            read_error_backoff,
        }
    }

    /// 运行直到取消
    ///
    /// 取消只在消息之间生效，正在执行的处理器会执行完毕。
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            event_types = ?self.registry.event_types(),
            "Projection consumer started"
        );

        loop {
            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.consumer.read_message() => result,
            };

            match result {
                Ok(message) => {
                    self.process(&message).await;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        backoff_ms = self.read_error_backoff.as_millis() as u64,
                        "Failed to read message from bus"
                    );
                    counter!("projection_messages_total", "outcome" => "read_error").increment(1);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.read_error_backoff) => {}
                    }
                }
            }
        }

        info!("Projection consumer stopped");
    }

    /// 读取并处理一条消息
    pub async fn poll_once(&self) -> AppResult<DispatchOutcome> {
        let message = self.consumer.read_message().await?;
        Ok(self.process(&message).await)
    }

    /// 分发一条消息，并按结果决定是否提交
    pub async fn process(&self, message: &BusMessage) -> DispatchOutcome {
        let outcome = self.dispatch(message).await;
        counter!("projection_messages_total", "outcome" => outcome.as_str()).increment(1);

        if outcome.should_commit() {
            if let Err(e) = self.consumer.commit(message).await {
                warn!(
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Failed to commit message offset"
                );
            }
        }

        outcome
    }

    /// 只分发，不提交
    pub async fn dispatch(&self, message: &BusMessage) -> DispatchOutcome {
        let Some(raw_key) = message.key.as_deref() else {
            warn!(
                partition = message.partition,
                offset = message.offset,
                "Skipping message without key"
            );
            return DispatchOutcome::Skipped(SkipReason::MalformedKey);
        };

        let key = match MessageKey::parse(raw_key) {
            Ok(key) => key,
            Err(e) => {
                warn!(key = %raw_key, offset = message.offset, error = %e, "Skipping message with malformed key");
                return DispatchOutcome::Skipped(SkipReason::MalformedKey);
            }
        };

        let event_type = match key.event_type() {
            Ok(event_type) => event_type,
            Err(e) => {
                warn!(key = %raw_key, offset = message.offset, error = %e, "Skipping unknown event type");
                return DispatchOutcome::Skipped(SkipReason::UnknownEventType);
            }
        };

        let Some(handler) = self.registry.get(event_type) else {
            debug!(event_type = %event_type, offset = message.offset, "No handler for event type, skipping");
            return DispatchOutcome::Skipped(SkipReason::Unhandled);
        };

        let envelope = match EventEnvelope::from_bytes(&message.payload) {
            Ok(envelope) if envelope.event_type == event_type.as_str() => envelope,
            Ok(envelope) => {
                warn!(
                    key = %raw_key,
                    envelope_type = %envelope.event_type,
                    offset = message.offset,
                    "Envelope type does not match message key, skipping"
                );
                return DispatchOutcome::Skipped(SkipReason::Undecodable);
            }
            Err(e) => {
                warn!(key = %raw_key, offset = message.offset, error = %e, "Skipping undecodable envelope");
                return DispatchOutcome::Skipped(SkipReason::Undecodable);
            }
        };

        let ctx = EventContext {
            event_id: envelope.event_id,
            event_type,
            routing_hint: key.routing_hint,
            partition: message.partition,
            offset: message.offset,
        };

        match handler.dispatch(&ctx, &envelope.payload).await {
            Ok(()) => {
                debug!(
                    event_id = %ctx.event_id,
                    event_type = %event_type,
                    offset = message.offset,
                    "Event handled"
                );
                DispatchOutcome::Handled
            }
            Err(HandlerFailure::Decode(e)) => {
                warn!(
                    event_id = %ctx.event_id,
                    event_type = %event_type,
                    error = %e,
                    "Skipping undecodable event payload"
                );
                DispatchOutcome::Skipped(SkipReason::Undecodable)
            }
            Err(HandlerFailure::Effect(e)) => {
                error!(
                    event_id = %ctx.event_id,
                    event_type = %event_type,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Event handler failed, offset not committed"
                );
                DispatchOutcome::Failed
            }
        }
    }
}
