//! 内存缓存

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use threads_errors::{AppError, AppResult};
use threads_ports::CachePort;
use tokio::time::Instant;

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, (String, Option<Instant>)>,
    failing: usize,
}

/// 内存缓存，过期在读取时惰性判断
#[derive(Clone, Default)]
pub struct InMemoryCache {
    state: Arc<Mutex<CacheState>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接下来 n 次操作失败
    pub fn fail_next(&self, n: usize) {
        self.state.lock().failing = n;
    }

    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .state
            .lock()
            .entries
            .iter()
            .filter(|(_, (_, deadline))| deadline.is_none_or(|d| d > now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    fn guard(state: &mut CacheState) -> AppResult<()> {
        if state.failing > 0 {
            state.failing -= 1;
            return Err(AppError::connection("Injected cache failure"));
        }
        Ok(())
    }

    fn live_value(state: &mut CacheState, key: &str) -> Option<String> {
        let now = Instant::now();
        match state.entries.get(key) {
            Some((_, Some(deadline))) if *deadline <= now => {
                state.entries.remove(key);
                None
            }
            Some((value, _)) => Some(value.clone()),
            None => None,
        }
    }
}

#[async_trait]
impl CachePort for InMemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut state = self.state.lock();
        Self::guard(&mut state)?;
        Ok(Self::live_value(&mut state, key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        let mut state = self.state.lock();
        Self::guard(&mut state)?;
        let deadline = ttl.map(|ttl| Instant::now() + ttl);
        state
            .entries
            .insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut state = self.state.lock();
        Self::guard(&mut state)?;
        state.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let mut state = self.state.lock();
        Self::guard(&mut state)?;
        Ok(Self::live_value(&mut state, key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<()> {
        let mut state = self.state.lock();
        Self::guard(&mut state)?;
        if let Some(entry) = state.entries.get_mut(key) {
            entry.1 = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}
