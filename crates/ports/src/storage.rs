//! 存储会话 trait 定义

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use threads_errors::AppResult;
use uuid::Uuid;

use crate::OutboxRecord;

/// 可绑定的参数值
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    BigInt(i64),
    Text(String),
    OptionalText(Option<String>),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::BigInt(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Option<String>> for Value {
    fn from(v: Option<String>) -> Self {
        Self::OptionalText(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

/// 一条领域变更语句
///
/// 查询文本对本层不透明，由存储适配器原样执行。
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub query: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
}

/// 原子批次中的一条写操作
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Mutation(Statement),
    Outbox(OutboxRecord),
}

/// 全部成功或全部不生效的写批次
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomicBatch {
    ops: Vec<WriteOp>,
}

impl AtomicBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mutation(mut self, statement: Statement) -> Self {
        self.ops.push(WriteOp::Mutation(statement));
        self
    }

    pub fn outbox(mut self, record: OutboxRecord) -> Self {
        self.ops.push(WriteOp::Outbox(record));
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// 存储会话 trait
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// 以单个原子单元执行整个批次
    async fn execute_atomic_batch(&self, batch: AtomicBatch) -> AppResult<()>;
}
