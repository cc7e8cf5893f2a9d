use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::KeyValueCache;
use crate::cancel::run_cancellable;
use crate::error::{ErrorCode, TaskError, TaskResult};

/// Redis-backed [`KeyValueCache`]
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn cache_error(operation: &'static str) -> impl FnOnce(redis::RedisError) -> TaskError {
    move |err| TaskError::wrap(err, ErrorCode::Unknown, operation)
}

#[async_trait]
impl KeyValueCache for RedisCache {
    async fn get(&self, cancel: &CancellationToken, key: &str) -> TaskResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        run_cancellable(cancel, async {
            conn.get(key).await.map_err(cache_error("cache get"))
        })
        .await
    }

    async fn set(
        &self,
        cancel: &CancellationToken,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> TaskResult<()> {
        let mut conn = self.conn.clone();
        run_cancellable(cancel, async {
            match ttl {
                // SET EX rejects 0, so sub-second TTLs round up.
                Some(ttl) => conn.set_ex(key, value, ttl.as_secs().max(1)).await,
                None => conn.set(key, value).await,
            }
            .map_err(cache_error("cache set"))
        })
        .await
    }

    async fn delete(&self, cancel: &CancellationToken, key: &str) -> TaskResult<()> {
        let mut conn = self.conn.clone();
        run_cancellable(cancel, async {
            conn.del(key).await.map_err(cache_error("cache delete"))
        })
        .await
    }
}
