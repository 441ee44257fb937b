//! 内存计数器与副作用账本

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use threads_errors::{AppError, AppResult};
use threads_ports::{
    CounterKey, CounterKind, CounterPort, EffectKey, FollowChange, FollowTransition,
};

#[derive(Default)]
struct CounterState {
    values: HashMap<CounterKey, i64>,
    /// effect -> 生效时间
    ledger: HashMap<EffectKey, DateTime<Utc>>,
    /// (user_id, following_id) -> (是否关注, 最近一次变更时间)
    follows: HashMap<(i64, i64), (bool, DateTime<Utc>)>,
    failing: HashMap<CounterKind, usize>,
}

impl CounterState {
    fn take_failure(&mut self, kind: CounterKind) -> bool {
        match self.failing.get_mut(&kind) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

/// 内存计数器
#[derive(Clone, Default)]
pub struct InMemoryCounters {
    state: Arc<Mutex<CounterState>>,
}

impl InMemoryCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// 该种类计数器接下来 times 次更新失败
    pub fn fail_next(&self, kind: CounterKind, times: usize) {
        self.state.lock().failing.insert(kind, times);
    }

    /// 账本中已生效的 effect 数
    pub fn applied_count(&self) -> usize {
        self.state.lock().ledger.len()
    }

    /// 计数器行是否已创建
    pub fn contains(&self, key: CounterKey) -> bool {
        self.state.lock().values.contains_key(&key)
    }

    /// 同步读取，测试断言使用
    pub fn value(&self, key: CounterKey) -> i64 {
        self.state.lock().values.get(&key).copied().unwrap_or(0)
    }

    /// 投影记录的关注关系状态
    pub fn is_following(&self, user_id: i64, following_id: i64) -> bool {
        self.state
            .lock()
            .follows
            .get(&(user_id, following_id))
            .is_some_and(|(following, _)| *following)
    }
}

#[async_trait]
impl CounterPort for InMemoryCounters {
    async fn initialize(&self, keys: &[CounterKey]) -> AppResult<()> {
        let mut state = self.state.lock();
        for key in keys {
            state.values.entry(*key).or_insert(0);
        }
        Ok(())
    }

    async fn apply_once(
        &self,
        effect: &EffectKey,
        key: CounterKey,
        delta: i64,
    ) -> AppResult<bool> {
        let mut state = self.state.lock();

        if state.take_failure(key.kind) {
            return Err(AppError::storage(format!("Injected failure updating {}", key)));
        }

        if state.ledger.contains_key(effect) {
            return Ok(false);
        }
        state.ledger.insert(effect.clone(), Utc::now());

        *state.values.entry(key).or_insert(0) += delta;
        Ok(true)
    }

    async fn get(&self, key: CounterKey) -> AppResult<i64> {
        Ok(self.value(key))
    }

    async fn apply_follow(&self, change: &FollowChange) -> AppResult<FollowTransition> {
        let mut state = self.state.lock();

        if state.take_failure(CounterKind::Followers) || state.take_failure(CounterKind::Following)
        {
            return Err(AppError::storage(format!(
                "Injected failure updating follow {} -> {}",
                change.user_id, change.following_id
            )));
        }

        let edge = (change.user_id, change.following_id);
        let previous = state.follows.get(&edge).copied();
        if let Some((following, at)) = previous {
            if change.at <= at {
                return Ok(FollowTransition {
                    following,
                    flipped: false,
                });
            }
        }

        state.follows.insert(edge, (change.following, change.at));
        let was_following = previous.is_some_and(|(following, _)| following);
        if was_following == change.following {
            return Ok(FollowTransition {
                following: change.following,
                flipped: false,
            });
        }

        let delta = change.delta();
        *state
            .values
            .entry(CounterKey::new(CounterKind::Followers, change.following_id))
            .or_insert(0) += delta;
        *state
            .values
            .entry(CounterKey::new(CounterKind::Following, change.user_id))
            .or_insert(0) += delta;

        Ok(FollowTransition {
            following: change.following,
            flipped: true,
        })
    }

    async fn purge_effects(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state.lock();
        let count = state.ledger.len();
        state.ledger.retain(|_, applied_at| *applied_at >= before);
        Ok((count - state.ledger.len()) as u64)
    }
}
