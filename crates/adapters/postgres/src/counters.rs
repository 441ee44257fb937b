//! PostgreSQL 计数器
//!
//! 计数器更新和副作用账本写入在同一事务中，同一 effect 最多生效一次。
//! 关注关系按变更时间取最新状态，只有状态翻转才调整计数器。

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{PgConnection, PgPool};
use threads_errors::{AppError, AppResult};
use threads_ports::{
    CounterKey, CounterKind, CounterPort, EffectKey, FollowChange, FollowTransition,
};
use tracing::debug;

/// 计数器所在的表和主键列
fn counter_table(kind: CounterKind) -> (&'static str, &'static str) {
    match kind {
        CounterKind::Followers | CounterKind::Following => ("user_counters", "user_id"),
        CounterKind::PostLikes | CounterKind::PostComments | CounterKind::PostShares => {
            ("post_counters", "post_id")
        }
    }
}

async fn add_to_counter(conn: &mut PgConnection, key: CounterKey, delta: i64) -> AppResult<()> {
    let (table, id_column) = counter_table(key.kind);
    let column = key.kind.as_str();
    let sql = format!(
        "INSERT INTO {table} ({id_column}, {column}) VALUES ($1, $2) \
         ON CONFLICT ({id_column}) DO UPDATE SET {column} = {table}.{column} + EXCLUDED.{column}"
    );
    sqlx::query(&sql)
        .bind(key.owner_id)
        .bind(delta)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::storage(format!("Failed to update counter {}: {}", key, e)))?;
    Ok(())
}

/// PostgreSQL 计数器
#[derive(Clone)]
pub struct PostgresCounters {
    pool: PgPool,
}

impl PostgresCounters {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterPort for PostgresCounters {
    async fn initialize(&self, keys: &[CounterKey]) -> AppResult<()> {
        for key in keys {
            let (table, id_column) = counter_table(key.kind);
            let sql = format!(
                "INSERT INTO {table} ({id_column}) VALUES ($1) ON CONFLICT ({id_column}) DO NOTHING"
            );
            sqlx::query(&sql)
                .bind(key.owner_id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    AppError::storage(format!("Failed to initialize counter {}: {}", key, e))
                })?;
        }
        Ok(())
    }

    async fn apply_once(
        &self,
        effect: &EffectKey,
        key: CounterKey,
        delta: i64,
    ) -> AppResult<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::storage(format!("Failed to begin transaction: {}", e)))?;

        let recorded = sqlx::query(
            r#"
            INSERT INTO applied_effects (event_id, effect)
            VALUES ($1, $2)
            ON CONFLICT (event_id, effect) DO NOTHING
            "#,
        )
        .bind(effect.event_id)
        .bind(&effect.effect)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::storage(format!("Failed to record effect {}: {}", effect, e)))?;

        if recorded.rows_affected() == 0 {
            debug!(effect = %effect, counter = %key, "Effect already applied, skipping");
            return Ok(false);
        }

        add_to_counter(&mut tx, key, delta).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::storage(format!("Failed to commit counter update: {}", e)))?;

        Ok(true)
    }

    async fn get(&self, key: CounterKey) -> AppResult<i64> {
        let (table, id_column) = counter_table(key.kind);
        let column = key.kind.as_str();
        let sql = format!("SELECT {column} FROM {table} WHERE {id_column} = $1");

        let row: Option<(i64,)> = sqlx::query_as(&sql)
            .bind(key.owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::storage(format!("Failed to read counter {}: {}", key, e)))?;

        Ok(row.map(|(v,)| v).unwrap_or(0))
    }

    async fn apply_follow(&self, change: &FollowChange) -> AppResult<FollowTransition> {
        // 与列精度一致，重复投递的同一事件比较结果为相等
        let at = change.at.trunc_subsecs(6);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::storage(format!("Failed to begin transaction: {}", e)))?;

        // 占位行保证随后的 FOR UPDATE 总能锁到一行
        sqlx::query(
            r#"
            INSERT INTO follow_state (user_id, following_id, following, changed_at)
            VALUES ($1, $2, FALSE, TIMESTAMPTZ 'epoch')
            ON CONFLICT (user_id, following_id) DO NOTHING
            "#,
        )
        .bind(change.user_id)
        .bind(change.following_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::storage(format!("Failed to seed follow state: {}", e)))?;

        let (was_following, changed_at): (bool, DateTime<Utc>) = sqlx::query_as(
            r#"
            SELECT following, changed_at FROM follow_state
            WHERE user_id = $1 AND following_id = $2
            FOR UPDATE
            "#,
        )
        .bind(change.user_id)
        .bind(change.following_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::storage(format!("Failed to read follow state: {}", e)))?;

        if at <= changed_at {
            debug!(
                user_id = change.user_id,
                following_id = change.following_id,
                "Stale follow change ignored"
            );
            return Ok(FollowTransition {
                following: was_following,
                flipped: false,
            });
        }

        sqlx::query(
            r#"
            UPDATE follow_state SET following = $3, changed_at = $4
            WHERE user_id = $1 AND following_id = $2
            "#,
        )
        .bind(change.user_id)
        .bind(change.following_id)
        .bind(change.following)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::storage(format!("Failed to update follow state: {}", e)))?;

        let flipped = was_following != change.following;
        if flipped {
            let delta = change.delta();
            add_to_counter(
                &mut tx,
                CounterKey::new(CounterKind::Followers, change.following_id),
                delta,
            )
            .await?;
            add_to_counter(
                &mut tx,
                CounterKey::new(CounterKind::Following, change.user_id),
                delta,
            )
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::storage(format!("Failed to commit follow change: {}", e)))?;

        Ok(FollowTransition {
            following: change.following,
            flipped,
        })
    }

    async fn purge_effects(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM applied_effects WHERE applied_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::storage(format!("Failed to purge effect ledger: {}", e)))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_table_mapping() {
        assert_eq!(counter_table(CounterKind::Followers), ("user_counters", "user_id"));
        assert_eq!(counter_table(CounterKind::PostComments), ("post_counters", "post_id"));
    }
}
