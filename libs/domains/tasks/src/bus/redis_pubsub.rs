use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Msg, RedisError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::{ChangeEvent, ChangePublisher, ChangeSubscriber, Delivery, ROUTING_PREFIX};
use crate::cancel::run_cancellable;
use crate::error::{ErrorCode, TaskError, TaskResult};

fn redis_error(operation: &'static str) -> impl FnOnce(RedisError) -> TaskError {
    move |err| TaskError::wrap(err, ErrorCode::Unknown, operation)
}

/// Publishes each event on the channel named after its routing key.
#[derive(Clone)]
pub struct RedisPubSubPublisher {
    conn: ConnectionManager,
}

impl RedisPubSubPublisher {
    pub async fn connect(url: &str) -> TaskResult<Self> {
        let client = Client::open(url).map_err(redis_error("open redis client"))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(redis_error("connect to redis"))?;
        Ok(Self::new(conn))
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ChangePublisher for RedisPubSubPublisher {
    #[instrument(skip(self, cancel, event), fields(event_type = %event.event_type(), task_id = %event.task_id()))]
    async fn publish(&self, cancel: &CancellationToken, event: &ChangeEvent) -> TaskResult<()> {
        let payload = event.encode()?;
        let channel = event.event_type().routing_key();
        let mut conn = self.conn.clone();

        let receivers: i64 = run_cancellable(cancel, async {
            conn.publish(channel, payload)
                .await
                .map_err(redis_error("publish event"))
        })
        .await?;

        debug!(channel, receivers, "Event published");
        Ok(())
    }
}

/// Pattern subscription to every `tasks.event.*` channel.
///
/// Pub/sub has no redelivery, so settling a message only logs it.
pub struct RedisPubSubSubscriber {
    messages: BoxStream<'static, Msg>,
    received: u64,
}

impl RedisPubSubSubscriber {
    pub async fn connect(url: &str) -> TaskResult<Self> {
        let client = Client::open(url).map_err(redis_error("open redis client"))?;
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(redis_error("open pub/sub connection"))?;

        let pattern = format!("{ROUTING_PREFIX}*");
        pubsub
            .psubscribe(&pattern)
            .await
            .map_err(redis_error("subscribe"))?;
        info!(pattern = %pattern, "Subscribed to task channels");

        Ok(Self {
            messages: pubsub.into_on_message().boxed(),
            received: 0,
        })
    }
}

#[async_trait]
impl ChangeSubscriber for RedisPubSubSubscriber {
    async fn receive(&mut self, cancel: &CancellationToken) -> TaskResult<Option<Delivery>> {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            message = self.messages.next() => message,
        };

        Ok(message.map(|msg| {
            self.received += 1;
            Delivery {
                id: self.received.to_string(),
                routing_key: msg.get_channel_name().to_string(),
                payload: msg.get_payload_bytes().to_vec(),
            }
        }))
    }

    async fn ack(&mut self, _cancel: &CancellationToken, delivery: &Delivery) -> TaskResult<()> {
        debug!(delivery_id = %delivery.id, "Message handled");
        Ok(())
    }

    async fn nack(&mut self, _cancel: &CancellationToken, delivery: &Delivery) -> TaskResult<()> {
        debug!(delivery_id = %delivery.id, "Message dropped, pub/sub cannot redeliver");
        Ok(())
    }

    async fn close(&mut self) -> TaskResult<()> {
        info!(received = self.received, "Redis pub/sub subscription closed");
        Ok(())
    }
}
