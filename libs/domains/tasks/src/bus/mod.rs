//! Task change notifications.
//!
//! Events are published to the `tasks` stream with routing keys
//! `tasks.event.created|updated|deleted`. Three transports carry them:
//!
//! - [`nats`]: JetStream stream with a durable pull consumer
//! - [`redis_stream`]: Redis stream read through a consumer group
//! - [`redis_pubsub`]: Redis pub/sub channels, at-most-once
//!
//! The service only sees [`ChangePublisher`]; the indexer only sees
//! [`ChangeSubscriber`].

pub mod nats;
pub mod redis_pubsub;
pub mod redis_stream;

use async_trait::async_trait;
use core_config::bus::{BusConfig, BusKind};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorCode, TaskError, TaskResult};
use crate::models::Task;

pub use nats::{NatsPublisher, NatsSubscriber};
pub use redis_pubsub::{RedisPubSubPublisher, RedisPubSubSubscriber};
pub use redis_stream::{RedisStreamPublisher, RedisStreamSubscriber};

/// Stream, exchange and topic name
pub const STREAM: &str = "tasks";
/// Common prefix of every routing key
pub const ROUTING_PREFIX: &str = "tasks.event.";
/// Durable consumer / consumer group used by the indexer
pub const CONSUMER: &str = "tasks-indexer";

/// Lifecycle transition carried by a [`ChangeEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum EventType {
    #[strum(serialize = "task.created")]
    Created,
    #[strum(serialize = "task.updated")]
    Updated,
    #[strum(serialize = "task.deleted")]
    Deleted,
}

impl EventType {
    pub fn routing_key(&self) -> &'static str {
        match self {
            EventType::Created => "tasks.event.created",
            EventType::Updated => "tasks.event.updated",
            EventType::Deleted => "tasks.event.deleted",
        }
    }
}

/// Wire envelope: `{"type": "task.created", "value": {...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ChangeEvent {
    #[serde(rename = "task.created")]
    Created(Task),
    #[serde(rename = "task.updated")]
    Updated(Task),
    #[serde(rename = "task.deleted")]
    Deleted { id: String },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown event type '{0}'")]
    UnknownType(String),
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    value: serde_json::Value,
}

#[derive(Deserialize)]
struct DeletedValue {
    id: String,
}

impl ChangeEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            ChangeEvent::Created(_) => EventType::Created,
            ChangeEvent::Updated(_) => EventType::Updated,
            ChangeEvent::Deleted { .. } => EventType::Deleted,
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            ChangeEvent::Created(task) | ChangeEvent::Updated(task) => &task.id,
            ChangeEvent::Deleted { id } => id,
        }
    }

    pub fn encode(&self) -> TaskResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| TaskError::wrap(e, ErrorCode::Unknown, "encode change event"))
    }

    /// Decode a payload, telling unknown event types apart from garbage.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let raw: RawEnvelope = serde_json::from_slice(payload)?;
        let event_type: EventType = raw
            .kind
            .parse()
            .map_err(|_| DecodeError::UnknownType(raw.kind.clone()))?;

        Ok(match event_type {
            EventType::Created => ChangeEvent::Created(serde_json::from_value(raw.value)?),
            EventType::Updated => ChangeEvent::Updated(serde_json::from_value(raw.value)?),
            EventType::Deleted => {
                let DeletedValue { id } = serde_json::from_value(raw.value)?;
                ChangeEvent::Deleted { id }
            }
        })
    }
}

/// Fire-and-forget publication of change events.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChangePublisher: Send + Sync {
    async fn publish(&self, cancel: &CancellationToken, event: &ChangeEvent) -> TaskResult<()>;
}

/// A message handed to the indexer, settled later with ack or nack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Transport-specific id used to settle the message
    pub id: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
}

/// Pull side of the bus, owned by a single consumer loop.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChangeSubscriber: Send {
    /// Next message, or `None` once `cancel` fires or the subscription ends
    async fn receive(&mut self, cancel: &CancellationToken) -> TaskResult<Option<Delivery>>;

    async fn ack(&mut self, cancel: &CancellationToken, delivery: &Delivery) -> TaskResult<()>;

    /// Ask for redelivery where the transport supports it
    async fn nack(&mut self, cancel: &CancellationToken, delivery: &Delivery) -> TaskResult<()>;

    async fn close(&mut self) -> TaskResult<()>;
}

fn config_error(err: core_config::ConfigError) -> TaskError {
    TaskError::wrap(err, ErrorCode::InvalidArgument, "bus configuration")
}

/// Publisher for the transport selected by [`BusConfig::kind`].
pub enum ChangeBus {
    Nats(NatsPublisher),
    RedisStream(RedisStreamPublisher),
    RedisPubSub(RedisPubSubPublisher),
}

impl ChangeBus {
    pub async fn connect(config: &BusConfig) -> TaskResult<Self> {
        Ok(match config.kind {
            BusKind::Nats => {
                ChangeBus::Nats(NatsPublisher::connect(config.nats_url().map_err(config_error)?).await?)
            }
            BusKind::RedisStream => ChangeBus::RedisStream(
                RedisStreamPublisher::connect(config.redis_url().map_err(config_error)?).await?,
            ),
            BusKind::RedisPubSub => ChangeBus::RedisPubSub(
                RedisPubSubPublisher::connect(config.redis_url().map_err(config_error)?).await?,
            ),
        })
    }
}

#[async_trait]
impl ChangePublisher for ChangeBus {
    async fn publish(&self, cancel: &CancellationToken, event: &ChangeEvent) -> TaskResult<()> {
        match self {
            ChangeBus::Nats(publisher) => publisher.publish(cancel, event).await,
            ChangeBus::RedisStream(publisher) => publisher.publish(cancel, event).await,
            ChangeBus::RedisPubSub(publisher) => publisher.publish(cancel, event).await,
        }
    }
}

/// Subscriber for the transport selected by [`BusConfig::kind`].
pub enum ChangeFeed {
    Nats(NatsSubscriber),
    RedisStream(RedisStreamSubscriber),
    RedisPubSub(RedisPubSubSubscriber),
}

impl ChangeFeed {
    /// Subscribe as `consumer` (durable name / group member).
    pub async fn connect(config: &BusConfig, consumer: &str) -> TaskResult<Self> {
        Ok(match config.kind {
            BusKind::Nats => ChangeFeed::Nats(
                NatsSubscriber::connect(config.nats_url().map_err(config_error)?, CONSUMER).await?,
            ),
            BusKind::RedisStream => ChangeFeed::RedisStream(
                RedisStreamSubscriber::connect(
                    config.redis_url().map_err(config_error)?,
                    CONSUMER,
                    consumer,
                )
                .await?
                .with_claim_idle(config.stream_claim_idle),
            ),
            BusKind::RedisPubSub => ChangeFeed::RedisPubSub(
                RedisPubSubSubscriber::connect(config.redis_url().map_err(config_error)?).await?,
            ),
        })
    }
}

#[async_trait]
impl ChangeSubscriber for ChangeFeed {
    async fn receive(&mut self, cancel: &CancellationToken) -> TaskResult<Option<Delivery>> {
        match self {
            ChangeFeed::Nats(feed) => feed.receive(cancel).await,
            ChangeFeed::RedisStream(feed) => feed.receive(cancel).await,
            ChangeFeed::RedisPubSub(feed) => feed.receive(cancel).await,
        }
    }

    async fn ack(&mut self, cancel: &CancellationToken, delivery: &Delivery) -> TaskResult<()> {
        match self {
            ChangeFeed::Nats(feed) => feed.ack(cancel, delivery).await,
            ChangeFeed::RedisStream(feed) => feed.ack(cancel, delivery).await,
            ChangeFeed::RedisPubSub(feed) => feed.ack(cancel, delivery).await,
        }
    }

    async fn nack(&mut self, cancel: &CancellationToken, delivery: &Delivery) -> TaskResult<()> {
        match self {
            ChangeFeed::Nats(feed) => feed.nack(cancel, delivery).await,
            ChangeFeed::RedisStream(feed) => feed.nack(cancel, delivery).await,
            ChangeFeed::RedisPubSub(feed) => feed.nack(cancel, delivery).await,
        }
    }

    async fn close(&mut self) -> TaskResult<()> {
        match self {
            ChangeFeed::Nats(feed) => feed.close().await,
            ChangeFeed::RedisStream(feed) => feed.close().await,
            ChangeFeed::RedisPubSub(feed) => feed.close().await,
        }
    }
}
