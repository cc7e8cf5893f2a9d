use crate::{ConfigError, Env, FromEnv};
use std::str::FromStr;
use std::time::Duration;

/// Message bus technology carrying task change events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusKind {
    /// NATS JetStream, subjects used as routing keys
    Nats,
    /// Redis stream used as an append-only log
    RedisStream,
    /// Redis pub/sub channels
    RedisPubSub,
}

impl FromStr for BusKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nats" => Ok(Self::Nats),
            "redis-stream" => Ok(Self::RedisStream),
            "redis-pubsub" => Ok(Self::RedisPubSub),
            other => Err(format!(
                "unknown bus kind '{other}', expected nats | redis-stream | redis-pubsub"
            )),
        }
    }
}

/// Bus selection and endpoints.
#[derive(Clone, Debug)]
pub struct BusConfig {
    pub kind: BusKind,
    /// Required when `kind` is [`BusKind::Nats`]
    pub nats_url: Option<String>,
    /// Required for the Redis-backed variants
    pub redis_url: Option<String>,
    /// Pending Redis stream entries idle this long are claimed for redelivery
    pub stream_claim_idle: Duration,
}

impl BusConfig {
    pub fn nats_url(&self) -> Result<&str, ConfigError> {
        self.nats_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("NATS_URL".to_string()))
    }

    pub fn redis_url(&self) -> Result<&str, ConfigError> {
        self.redis_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("REDIS_URL".to_string()))
    }
}

impl FromEnv for BusConfig {
    fn from_env(env: &Env) -> Result<Self, ConfigError> {
        let kind: BusKind = env.parse_or("BUS_KIND", BusKind::Nats)?;
        let config = Self {
            kind,
            nats_url: env.get("NATS_URL").map(str::to_string),
            redis_url: env.get("REDIS_URL").map(str::to_string),
            stream_claim_idle: Duration::from_secs(
                env.parse_or("REDIS_STREAM_CLAIM_IDLE_SECS", 30)?,
            ),
        };

        match kind {
            BusKind::Nats => config.nats_url()?,
            BusKind::RedisStream | BusKind::RedisPubSub => config.redis_url()?,
        };

        Ok(config)
    }
}

/// Indexer loop settings.
#[derive(Clone, Debug)]
pub struct IndexerConfig {
    /// Deadline for finishing the in-flight message after shutdown is requested
    pub drain_timeout: Duration,
}

impl FromEnv for IndexerConfig {
    fn from_env(env: &Env) -> Result<Self, ConfigError> {
        Ok(Self {
            drain_timeout: Duration::from_secs(env.parse_or("INDEXER_DRAIN_TIMEOUT_SECS", 10)?),
        })
    }
}
