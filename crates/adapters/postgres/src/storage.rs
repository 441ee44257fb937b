//! PostgreSQL 存储会话与 outbox 表

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;
use threads_errors::{AppError, AppResult};
use threads_ports::{
    AtomicBatch, OutboxPort, OutboxRecord, Statement, StoragePort, Value, WriteOp,
};
use tracing::debug;
use uuid::Uuid;

/// PostgreSQL 存储
///
/// 原子批次在一个事务中执行；outbox 读写直接使用连接池。
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// 按顺序绑定语句参数
pub(crate) fn bind_statement(statement: &Statement) -> Query<'_, Postgres, PgArguments> {
    statement
        .params
        .iter()
        .fold(sqlx::query(&statement.query), |query, value| match value {
            Value::Bool(v) => query.bind(*v),
            Value::BigInt(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::OptionalText(v) => query.bind(v.as_deref()),
            Value::Bytes(v) => query.bind(v.as_slice()),
            Value::Timestamp(v) => query.bind(*v),
            Value::Uuid(v) => query.bind(*v),
        })
}

#[async_trait]
impl StoragePort for PostgresStorage {
    async fn execute_atomic_batch(&self, batch: AtomicBatch) -> AppResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::storage(format!("Failed to begin transaction: {}", e)))?;

        for op in batch.ops() {
            match op {
                WriteOp::Mutation(statement) => {
                    bind_statement(statement)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| {
                            AppError::storage(format!("Failed to execute mutation: {}", e))
                        })?;
                }
                WriteOp::Outbox(record) => {
                    sqlx::query(
                        r#"
                        INSERT INTO outbox
                            (event_id, event_type, routing_hint, payload, published, created_at, expires_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7)
                        "#,
                    )
                    .bind(record.event_id)
                    .bind(&record.event_type)
                    .bind(&record.routing_hint)
                    .bind(&record.payload)
                    .bind(record.published)
                    .bind(record.created_at)
                    .bind(record.expires_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| AppError::storage(format!("Failed to insert outbox record: {}", e)))?;
                }
            }
        }

        // 提前返回时 tx 被 drop，事务自动回滚
        tx.commit()
            .await
            .map_err(|e| AppError::storage(format!("Failed to commit transaction: {}", e)))?;

        debug!(ops = batch.len(), "Atomic batch committed");
        Ok(())
    }
}

#[async_trait]
impl OutboxPort for PostgresStorage {
    async fn fetch_unpublished(&self, limit: usize) -> AppResult<Vec<OutboxRecord>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT event_id, event_type, routing_hint, payload, published, created_at, expires_at
            FROM outbox
            WHERE published = FALSE
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::storage(format!("Failed to fetch unpublished records: {}", e)))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_published(&self, event_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET published = TRUE
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::storage(format!("Failed to mark record published: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::storage(format!(
                "Outbox record {} not found",
                event_id
            )));
        }

        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM outbox
            WHERE published = TRUE AND expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::storage(format!("Failed to purge outbox records: {}", e)))?;

        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    event_id: Uuid,
    event_type: String,
    routing_hint: String,
    payload: Vec<u8>,
    published: bool,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<OutboxRow> for OutboxRecord {
    fn from(row: OutboxRow) -> Self {
        Self {
            event_id: row.event_id,
            event_type: row.event_type,
            routing_hint: row.routing_hint,
            payload: row.payload,
            published: row.published,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}
