use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, RedisResult};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{ChangeEvent, ChangePublisher, ChangeSubscriber, Delivery, STREAM};
use crate::cancel::run_cancellable;
use crate::error::{ErrorCode, TaskError, TaskResult};

/// Approximate cap applied on every `XADD`
const MAX_LEN: usize = 100_000;
const READ_COUNT: usize = 16;
const IDLE_POLL: Duration = Duration::from_millis(250);
pub const DEFAULT_CLAIM_IDLE: Duration = Duration::from_secs(30);

const FIELD_TYPE: &str = "type";
const FIELD_EVENT: &str = "event";

type StreamEntry = (String, Vec<(String, String)>);
type StreamReply = Vec<(String, Vec<StreamEntry>)>;
/// `XPENDING` summary row: id, owner, idle ms, delivery count
type PendingEntry = (String, String, u64, u64);

fn redis_error(operation: &'static str) -> impl FnOnce(RedisError) -> TaskError {
    move |err| TaskError::wrap(err, ErrorCode::Unknown, operation)
}

async fn connect(url: &str) -> TaskResult<ConnectionManager> {
    let client = Client::open(url).map_err(redis_error("open redis client"))?;
    ConnectionManager::new(client)
        .await
        .map_err(redis_error("connect to redis"))
}

/// Appends events to the `tasks` stream as `type=<routing key>`, `event=<json>`.
#[derive(Clone)]
pub struct RedisStreamPublisher {
    conn: ConnectionManager,
}

impl RedisStreamPublisher {
    pub async fn connect(url: &str) -> TaskResult<Self> {
        Ok(Self::new(connect(url).await?))
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ChangePublisher for RedisStreamPublisher {
    #[instrument(skip(self, cancel, event), fields(event_type = %event.event_type(), task_id = %event.task_id()))]
    async fn publish(&self, cancel: &CancellationToken, event: &ChangeEvent) -> TaskResult<()> {
        let payload = event.encode()?;
        let mut conn = self.conn.clone();

        let entry_id: String = run_cancellable(cancel, async {
            redis::cmd("XADD")
                .arg(STREAM)
                .arg("MAXLEN")
                .arg("~")
                .arg(MAX_LEN)
                .arg("*")
                .arg(FIELD_TYPE)
                .arg(event.event_type().routing_key())
                .arg(FIELD_EVENT)
                .arg(payload)
                .query_async(&mut conn)
                .await
                .map_err(redis_error("append event"))
        })
        .await?;

        debug!(entry_id = %entry_id, "Event appended");
        Ok(())
    }
}

/// Consumer-group reader of the `tasks` stream.
///
/// On start the consumer's pending entries (delivered earlier but never
/// acknowledged) are replayed before new entries are read. A nack leaves the
/// entry pending. Entries of any group member that stay pending longer than
/// the claim idle time are claimed by this consumer and delivered again.
pub struct RedisStreamSubscriber {
    conn: ConnectionManager,
    group: String,
    consumer: String,
    buffer: VecDeque<Delivery>,
    /// Last pending id replayed, `None` once the backlog is exhausted
    backlog_cursor: Option<String>,
    claim_idle: Duration,
    last_claim: Instant,
}

impl RedisStreamSubscriber {
    pub async fn connect(url: &str, group: &str, consumer: &str) -> TaskResult<Self> {
        let subscriber = Self::new(connect(url).await?, group, consumer);
        subscriber.ensure_group().await?;
        Ok(subscriber)
    }

    pub fn new(conn: ConnectionManager, group: &str, consumer: &str) -> Self {
        Self {
            conn,
            group: group.to_string(),
            consumer: consumer.to_string(),
            buffer: VecDeque::new(),
            backlog_cursor: Some("0".to_string()),
            claim_idle: DEFAULT_CLAIM_IDLE,
            last_claim: Instant::now(),
        }
    }

    /// Minimum idle time before a pending entry is claimed; also the interval
    /// between claim attempts.
    pub fn with_claim_idle(mut self, claim_idle: Duration) -> Self {
        self.claim_idle = claim_idle;
        self
    }

    /// Create the consumer group (and the stream) unless it exists.
    pub async fn ensure_group(&self) -> TaskResult<()> {
        let mut conn = self.conn.clone();
        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(STREAM)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => {
                info!(stream = STREAM, group = %self.group, "Created consumer group");
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(stream = STREAM, group = %self.group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(redis_error("create consumer group")(e)),
        }
    }

    async fn read(&mut self, cursor: &str) -> TaskResult<Vec<Delivery>> {
        let mut conn = self.conn.clone();
        let result: RedisResult<Option<StreamReply>> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(READ_COUNT)
            .arg("STREAMS")
            .arg(STREAM)
            .arg(cursor)
            .query_async(&mut conn)
            .await;

        let reply = match result {
            Ok(reply) => reply.unwrap_or_default(),
            Err(e) if e.to_string().contains("NOGROUP") => {
                warn!(group = %self.group, "Consumer group missing, recreating");
                self.ensure_group().await?;
                Vec::new()
            }
            Err(e) => return Err(redis_error("read stream")(e)),
        };

        Ok(reply
            .into_iter()
            .flat_map(|(_, entries)| entries)
            .map(into_delivery)
            .collect())
    }

    /// Claim entries left pending by any group member for at least the claim idle time.
    async fn claim_idle_entries(&mut self) -> TaskResult<Vec<Delivery>> {
        let mut conn = self.conn.clone();
        let min_idle = self.claim_idle.as_millis() as u64;

        let pending: RedisResult<Vec<PendingEntry>> = redis::cmd("XPENDING")
            .arg(STREAM)
            .arg(&self.group)
            .arg("-")
            .arg("+")
            .arg(READ_COUNT)
            .query_async(&mut conn)
            .await;

        let pending = match pending {
            Ok(pending) => pending,
            Err(e) if e.to_string().contains("NOGROUP") => return Ok(Vec::new()),
            Err(e) => return Err(redis_error("list pending entries")(e)),
        };

        let ids: Vec<String> = pending
            .into_iter()
            .filter(|(_, _, idle, _)| *idle >= min_idle)
            .map(|(id, _, _, _)| id)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(STREAM)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(min_idle)
            .arg(&ids);

        // Entries trimmed from the stream come back as nil.
        let claimed: Vec<Option<StreamEntry>> = cmd
            .query_async(&mut conn)
            .await
            .map_err(redis_error("claim pending entries"))?;

        let claimed: Vec<Delivery> = claimed.into_iter().flatten().map(into_delivery).collect();
        if !claimed.is_empty() {
            warn!(count = claimed.len(), "Claimed idle pending entries");
        }
        Ok(claimed)
    }

    async fn fill(&mut self) -> TaskResult<()> {
        if let Some(cursor) = self.backlog_cursor.clone() {
            let pending = self.read(&cursor).await?;
            match pending.last() {
                Some(last) => {
                    debug!(count = pending.len(), "Replaying pending entries");
                    self.backlog_cursor = Some(last.id.clone());
                    self.buffer.extend(pending);
                    return Ok(());
                }
                None => self.backlog_cursor = None,
            }
        }

        if self.last_claim.elapsed() >= self.claim_idle {
            self.last_claim = Instant::now();
            let claimed = self.claim_idle_entries().await?;
            if !claimed.is_empty() {
                self.buffer.extend(claimed);
                return Ok(());
            }
        }

        let fresh = self.read(">").await?;
        self.buffer.extend(fresh);
        Ok(())
    }
}

fn into_delivery((id, fields): (String, Vec<(String, String)>)) -> Delivery {
    let mut delivery = Delivery {
        id,
        routing_key: String::new(),
        payload: Vec::new(),
    };
    for (name, value) in fields {
        match name.as_str() {
            FIELD_TYPE => delivery.routing_key = value,
            FIELD_EVENT => delivery.payload = value.into_bytes(),
            _ => {}
        }
    }
    delivery
}

#[async_trait]
impl ChangeSubscriber for RedisStreamSubscriber {
    async fn receive(&mut self, cancel: &CancellationToken) -> TaskResult<Option<Delivery>> {
        loop {
            if let Some(delivery) = self.buffer.pop_front() {
                return Ok(Some(delivery));
            }
            if cancel.is_cancelled() {
                return Ok(None);
            }

            match run_cancellable(cancel, self.fill()).await {
                Ok(()) => {}
                Err(_) if cancel.is_cancelled() => return Ok(None),
                Err(e) => return Err(e),
            }

            if self.buffer.is_empty() {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(IDLE_POLL) => {}
                }
            }
        }
    }

    async fn ack(&mut self, cancel: &CancellationToken, delivery: &Delivery) -> TaskResult<()> {
        let mut conn = self.conn.clone();
        let acked: i64 = run_cancellable(cancel, async {
            redis::cmd("XACK")
                .arg(STREAM)
                .arg(&self.group)
                .arg(&delivery.id)
                .query_async(&mut conn)
                .await
                .map_err(redis_error("ack entry"))
        })
        .await?;

        if acked == 0 {
            warn!(delivery_id = %delivery.id, "Entry was not pending");
        }
        Ok(())
    }

    async fn nack(&mut self, _cancel: &CancellationToken, delivery: &Delivery) -> TaskResult<()> {
        debug!(delivery_id = %delivery.id, "Leaving entry pending until it is claimed");
        Ok(())
    }

    async fn close(&mut self) -> TaskResult<()> {
        if !self.buffer.is_empty() {
            debug!(count = self.buffer.len(), "Dropping buffered entries, they stay pending");
            self.buffer.clear();
        }
        info!(group = %self.group, consumer = %self.consumer, "Redis stream subscription closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_fields_map_to_delivery() {
        let delivery = into_delivery((
            "1700000000000-0".to_string(),
            vec![
                ("type".to_string(), "tasks.event.deleted".to_string()),
                ("event".to_string(), r#"{"type":"task.deleted"}"#.to_string()),
                ("extra".to_string(), "ignored".to_string()),
            ],
        ));

        assert_eq!(delivery.id, "1700000000000-0");
        assert_eq!(delivery.routing_key, "tasks.event.deleted");
        assert_eq!(delivery.payload, br#"{"type":"task.deleted"}"#.to_vec());
    }
}
