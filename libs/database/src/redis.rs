//! Redis connection manager

use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;

use crate::common::{DatabaseError, RetryConfig, retry_with_backoff};

/// Open a [`ConnectionManager`] and verify it with `PING`.
///
/// The manager reconnects on its own after the initial handshake; retries
/// here only cover startup.
pub async fn connect(url: &str, retry: &RetryConfig) -> Result<ConnectionManager, DatabaseError> {
    let client = Client::open(url)?;

    let manager = retry_with_backoff("redis", retry, || {
        let client = client.clone();
        async move {
            let manager = ConnectionManager::new(client).await?;
            let mut conn = manager.clone();
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>(manager)
        }
    })
    .await?;

    info!("Connected to Redis");
    Ok(manager)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let retry = RetryConfig::default()
            .with_max_retries(0)
            .with_initial_delay(Duration::from_millis(1));

        let err = connect("not-a-redis-url", &retry).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Redis(_)));
    }
}
