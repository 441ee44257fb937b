//! 副作用组
//!
//! 一个处理器的多个下游副作用并发执行，全部成功才算成功。
//! 第一个失败会丢弃其余尚未完成的副作用，并以 `AppError::Handler` 返回。

use std::future::Future;

use futures::future::{BoxFuture, FutureExt, try_join_all};
use threads_errors::{AppError, AppResult};

/// 固定数量的并发副作用
#[derive(Default)]
pub struct EffectGroup<'a> {
    effects: Vec<(&'static str, BoxFuture<'a, AppResult<()>>)>,
}

impl<'a> EffectGroup<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入一个具名副作用
    pub fn with<F>(mut self, name: &'static str, effect: F) -> Self
    where
        F: Future<Output = AppResult<()>> + Send + 'a,
    {
        self.effects.push((name, effect.boxed()));
        self
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// 并发执行并汇总结果
    pub async fn join(self) -> AppResult<()> {
        let tasks = self.effects.into_iter().map(|(name, effect)| async move {
            effect.await.map_err(|e| match e {
                AppError::Handler { .. } => e,
                other => AppError::handler(name, other.to_string()),
            })
        });

        try_join_all(tasks).await.map(|_| ())
    }
}
