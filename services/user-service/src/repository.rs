//! 用户写路径

use std::sync::Arc;

use chrono::Utc;
use threads_errors::{AppError, AppResult};
use threads_event_core::{UserCreated, UserFollowed, UserUnfollowed};
use threads_outbox::OutboxWriter;
use threads_ports::{AuthContext, CachePort, IdGenerator, Statement, following_cache_key};
use tracing::info;

const INSERT_USER: &str =
    "INSERT INTO users (id, username, full_name, email, created_at) VALUES ($1, $2, $3, $4, $5)";
const INSERT_FOLLOW: &str =
    "INSERT INTO follows (user_id, following_id, created_at) VALUES ($1, $2, $3)";
const DELETE_FOLLOW: &str = "DELETE FROM follows WHERE user_id = $1 AND following_id = $2";

/// 注册请求
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub full_name: String,
    pub email: String,
}

impl NewUser {
    fn validate(&self) -> AppResult<()> {
        if self.username.trim().is_empty() {
            return Err(AppError::validation("Username must not be empty"));
        }
        if !self.email.contains('@') {
            return Err(AppError::validation(format!("Invalid email: {}", self.email)));
        }
        Ok(())
    }
}

/// 用户仓储
///
/// 每个写操作把领域语句和对应事件作为一个原子批次提交。
/// 关注和取消关注的前置检查读取投影维护的缓存，事件投影完成前
/// 可能放过重复请求；投影按事件时间取最新状态，计数器不受影响。
pub struct UserRepository {
    writer: OutboxWriter,
    cache: Arc<dyn CachePort>,
    ids: Arc<dyn IdGenerator>,
    auth: Arc<dyn AuthContext>,
}

impl UserRepository {
    pub fn new(
        writer: OutboxWriter,
        cache: Arc<dyn CachePort>,
        ids: Arc<dyn IdGenerator>,
        auth: Arc<dyn AuthContext>,
    ) -> Self {
        Self {
            writer,
            cache,
            ids,
            auth,
        }
    }

    pub async fn create_user(&self, new_user: NewUser) -> AppResult<UserCreated> {
        new_user.validate()?;

        let event = UserCreated {
            user_id: self.ids.next_id()?,
            username: new_user.username,
            full_name: new_user.full_name,
            email: new_user.email,
            created_at: Utc::now(),
        };

        let insert = Statement::new(INSERT_USER)
            .bind(event.user_id)
            .bind(event.username.as_str())
            .bind(event.full_name.as_str())
            .bind(event.email.as_str())
            .bind(event.created_at);

        let event_id = self.writer.append(vec![insert], &event).await?;
        info!(user_id = event.user_id, event_id = %event_id, "User created");
        Ok(event)
    }

    /// 当前用户关注 `following_id`
    pub async fn follow_user(&self, following_id: i64) -> AppResult<UserFollowed> {
        let user_id = self.auth.current_user()?;
        if user_id == following_id {
            return Err(AppError::validation("User cannot follow themselves"));
        }
        if self.is_following(user_id, following_id).await? {
            return Err(AppError::validation("User already following"));
        }

        let event = UserFollowed {
            user_id,
            following_id,
            followed_at: Utc::now(),
        };

        let insert = Statement::new(INSERT_FOLLOW)
            .bind(user_id)
            .bind(following_id)
            .bind(event.followed_at);

        let event_id = self.writer.append(vec![insert], &event).await?;
        info!(user_id, following_id, event_id = %event_id, "User followed");
        Ok(event)
    }

    /// 当前用户取消关注 `following_id`
    pub async fn unfollow_user(&self, following_id: i64) -> AppResult<UserUnfollowed> {
        let user_id = self.auth.current_user()?;
        if user_id == following_id {
            return Err(AppError::validation("User cannot unfollow themselves"));
        }
        if !self.is_following(user_id, following_id).await? {
            return Err(AppError::validation("User is not following"));
        }

        let event = UserUnfollowed {
            user_id,
            following_id,
            unfollowed_at: Utc::now(),
        };

        let delete = Statement::new(DELETE_FOLLOW).bind(user_id).bind(following_id);

        let event_id = self.writer.append(vec![delete], &event).await?;
        info!(user_id, following_id, event_id = %event_id, "User unfollowed");
        Ok(event)
    }

    pub async fn is_following(&self, user_id: i64, following_id: i64) -> AppResult<bool> {
        let value = self
            .cache
            .get(&following_cache_key(user_id, following_id))
            .await?;
        Ok(value.as_deref() == Some("1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use threads_adapter_memory::{
        FixedAuthContext, InMemoryCache, InMemoryStorage, SequenceIdGenerator,
    };
    use threads_ports::Value;

    struct Fixture {
        storage: InMemoryStorage,
        cache: InMemoryCache,
        repo: UserRepository,
    }

    fn fixture(auth: FixedAuthContext) -> Fixture {
        let storage = InMemoryStorage::new();
        let cache = InMemoryCache::new();
        let writer =
            OutboxWriter::new(Arc::new(storage.clone()), Duration::from_secs(86_400)).unwrap();
        let repo = UserRepository::new(
            writer,
            Arc::new(cache.clone()),
            Arc::new(SequenceIdGenerator::starting_at(100)),
            Arc::new(auth),
        );
        Fixture {
            storage,
            cache,
            repo,
        }
    }

    fn alice() -> NewUser {
        NewUser {
            username: "alice".to_string(),
            full_name: "Alice Liddell".to_string(),
            email: "alice@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_user_writes_row_and_event() {
        let f = fixture(FixedAuthContext::anonymous());

        let event = f.repo.create_user(alice()).await.unwrap();

        assert_eq!(event.user_id, 100);
        let mutations = f.storage.mutations();
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].params[0], Value::BigInt(100));

        let records = f.storage.outbox_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "user.created");
        assert_eq!(records[0].routing_hint, "100");
        assert!(!records[0].published);
    }

    #[tokio::test]
    async fn test_create_user_rejects_bad_email() {
        let f = fixture(FixedAuthContext::anonymous());
        let mut user = alice();
        user.email = "alice".to_string();

        let err = f.repo.create_user(user).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(f.storage.outbox_records().is_empty());
    }

    #[tokio::test]
    async fn test_follow_routes_by_followed_user() {
        let f = fixture(FixedAuthContext::user(1));

        let event = f.repo.follow_user(2).await.unwrap();

        assert_eq!((event.user_id, event.following_id), (1, 2));
        let records = f.storage.outbox_records();
        assert_eq!(records[0].event_type, "user.followed");
        assert_eq!(records[0].routing_hint, "2");
    }

    #[tokio::test]
    async fn test_self_follow_is_rejected() {
        let f = fixture(FixedAuthContext::user(1));

        let err = f.repo.follow_user(1).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(f.storage.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_cached_follow_is_rejected() {
        let f = fixture(FixedAuthContext::user(1));
        f.cache
            .set(&following_cache_key(1, 2), "1", None)
            .await
            .unwrap();

        let err = f.repo.follow_user(2).await.unwrap_err();

        assert!(err.to_string().contains("already following"));
        assert!(f.storage.outbox_records().is_empty());
    }

    #[tokio::test]
    async fn test_follow_requires_authentication() {
        let f = fixture(FixedAuthContext::anonymous());
        assert!(f.repo.follow_user(2).await.is_err());
        assert!(f.repo.unfollow_user(2).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_nothing_behind() {
        let f = fixture(FixedAuthContext::user(1));
        f.storage.fail_next_batches(1);

        assert!(f.repo.follow_user(2).await.is_err());

        assert!(f.storage.mutations().is_empty());
        assert!(f.storage.outbox_records().is_empty());
    }

    #[tokio::test]
    async fn test_self_unfollow_is_rejected() {
        let f = fixture(FixedAuthContext::user(1));
        f.cache
            .set(&following_cache_key(1, 1), "1", None)
            .await
            .unwrap();

        let err = f.repo.unfollow_user(1).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(f.storage.outbox_records().is_empty());
    }

    #[tokio::test]
    async fn test_unfollow_requires_existing_follow() {
        let f = fixture(FixedAuthContext::user(1));

        let err = f.repo.unfollow_user(2).await.unwrap_err();

        assert!(err.to_string().contains("not following"));
        assert!(f.storage.mutations().is_empty());
        assert!(f.storage.outbox_records().is_empty());
    }

    #[tokio::test]
    async fn test_unfollow_of_cached_follow() {
        let f = fixture(FixedAuthContext::user(1));
        f.cache
            .set(&following_cache_key(1, 2), "1", None)
            .await
            .unwrap();

        let event = f.repo.unfollow_user(2).await.unwrap();

        assert_eq!((event.user_id, event.following_id), (1, 2));
        let records = f.storage.outbox_records();
        assert_eq!(records[0].event_type, "user.unfollowed");
        assert_eq!(records[0].routing_hint, "2");
    }
}
