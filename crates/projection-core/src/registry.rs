//! 事件处理器注册表

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use threads_errors::{AppError, AppResult};
use threads_event_core::{EventType, TypedEvent};
use threads_ports::EffectKey;
use uuid::Uuid;

/// 当前消息的上下文
#[derive(Debug, Clone)]
pub struct EventContext {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub routing_hint: String,
    pub partition: i32,
    pub offset: i64,
}

impl EventContext {
    /// 本事件某个副作用的去重键
    pub fn effect_key(&self, effect: &str) -> EffectKey {
        EffectKey::new(self.event_id, effect)
    }
}

/// 某一事件类型的处理器
///
/// 同一事件可能被投递多次，实现必须容忍重复。
/// 返回错误时消息不会被提交。
#[async_trait]
pub trait EventHandler<E: TypedEvent>: Send + Sync {
    async fn handle(&self, ctx: &EventContext, event: E) -> AppResult<()>;
}

#[async_trait]
impl<E, H> EventHandler<E> for Arc<H>
where
    E: TypedEvent,
    H: EventHandler<E> + ?Sized,
{
    async fn handle(&self, ctx: &EventContext, event: E) -> AppResult<()> {
        (**self).handle(ctx, event).await
    }
}

/// 分发失败的分类
#[derive(Debug)]
pub(crate) enum HandlerFailure {
    /// 负载无法解码，重试也不会成功
    Decode(AppError),
    /// 下游副作用失败
    Effect(AppError),
}

#[async_trait]
pub(crate) trait ErasedHandler: Send + Sync {
    async fn dispatch(&self, ctx: &EventContext, payload: &[u8]) -> Result<(), HandlerFailure>;
}

struct Typed<E, H> {
    handler: H,
    _event: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E, H> ErasedHandler for Typed<E, H>
where
    E: TypedEvent,
    H: EventHandler<E>,
{
    async fn dispatch(&self, ctx: &EventContext, payload: &[u8]) -> Result<(), HandlerFailure> {
        let event = E::decode(payload).map_err(HandlerFailure::Decode)?;
        self.handler
            .handle(ctx, event)
            .await
            .map_err(HandlerFailure::Effect)
    }
}

/// 注册表构建器
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: BTreeMap<EventType, Arc<dyn ErasedHandler>>,
    duplicates: Vec<EventType>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器，事件类型由 `E` 决定
    pub fn register<E, H>(mut self, handler: H) -> Self
    where
        E: TypedEvent,
        H: EventHandler<E> + 'static,
    {
        let typed = Typed::<E, H> {
            handler,
            _event: PhantomData,
        };
        if self
            .handlers
            .insert(E::EVENT_TYPE, Arc::new(typed))
            .is_some()
        {
            self.duplicates.push(E::EVENT_TYPE);
        }
        self
    }

    /// 校验并构建
    ///
    /// `required` 中任一类型没有处理器，或同一类型注册了多次，都会失败。
    pub fn build(self, required: &[EventType]) -> AppResult<HandlerRegistry> {
        if !self.duplicates.is_empty() {
            return Err(AppError::config(format!(
                "Duplicate handlers registered for: {}",
                join_types(&self.duplicates)
            )));
        }

        let missing: Vec<EventType> = required
            .iter()
            .copied()
            .filter(|t| !self.handlers.contains_key(t))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::config(format!(
                "No handler registered for: {}",
                join_types(&missing)
            )));
        }

        Ok(HandlerRegistry {
            handlers: self.handlers,
        })
    }
}

fn join_types(types: &[EventType]) -> String {
    types
        .iter()
        .map(EventType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// 已校验的处理器表
pub struct HandlerRegistry {
    handlers: BTreeMap<EventType, Arc<dyn ErasedHandler>>,
}

impl HandlerRegistry {
    pub fn handles(&self, event_type: EventType) -> bool {
        self.handlers.contains_key(&event_type)
    }

    pub fn event_types(&self) -> Vec<EventType> {
        self.handlers.keys().copied().collect()
    }

    pub(crate) fn get(&self, event_type: EventType) -> Option<&Arc<dyn ErasedHandler>> {
        self.handlers.get(&event_type)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("event_types", &self.event_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threads_event_core::{LikeCreated, PostCreated};

    struct Noop;

    #[async_trait]
    impl EventHandler<PostCreated> for Noop {
        async fn handle(&self, _ctx: &EventContext, _event: PostCreated) -> AppResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl EventHandler<LikeCreated> for Noop {
        async fn handle(&self, _ctx: &EventContext, _event: LikeCreated) -> AppResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_build_with_required_types() {
        let registry = RegistryBuilder::new()
            .register::<PostCreated, _>(Noop)
            .register::<LikeCreated, _>(Noop)
            .build(&[EventType::PostCreated, EventType::LikeCreated])
            .unwrap();

        assert!(registry.handles(EventType::PostCreated));
        assert!(!registry.handles(EventType::UserFollowed));
        assert_eq!(registry.event_types().len(), 2);
    }

    #[test]
    fn test_missing_handler_fails_at_build() {
        let err = RegistryBuilder::new()
            .register::<PostCreated, _>(Noop)
            .build(&[EventType::PostCreated, EventType::CommentCreated])
            .unwrap_err();

        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("comment.created"));
    }

    #[test]
    fn test_duplicate_handler_fails_at_build() {
        let shared = Arc::new(Noop);
        let err = RegistryBuilder::new()
            .register::<PostCreated, _>(shared.clone())
            .register::<PostCreated, _>(shared)
            .build(&[])
            .unwrap_err();

        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("post.created"));
    }
}
