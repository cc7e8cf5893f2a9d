use async_nats::jetstream::consumer::AckPolicy;
use async_nats::jetstream::consumer::pull::{Config as ConsumerConfig, Stream as MessageStream};
use async_nats::jetstream::stream::{Config as StreamConfig, Stream};
use async_nats::jetstream::{self, AckKind, Context, Message};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{ChangeEvent, ChangePublisher, ChangeSubscriber, Delivery, ROUTING_PREFIX, STREAM};
use crate::cancel::run_cancellable;
use crate::error::{BoxError, ErrorCode, TaskError, TaskResult};

fn nats_error<E: Into<BoxError>>(operation: &'static str) -> impl FnOnce(E) -> TaskError {
    move |err| TaskError::wrap(err, ErrorCode::Unknown, operation)
}

async fn connect(url: &str) -> TaskResult<Context> {
    let client = async_nats::connect(url)
        .await
        .map_err(nats_error("connect to NATS"))?;
    info!(url = %url, "Connected to NATS");
    Ok(jetstream::new(client))
}

/// Get the `tasks` stream, creating it on first use.
async fn ensure_stream(jetstream: &Context) -> TaskResult<Stream> {
    match jetstream.get_stream(STREAM).await {
        Ok(stream) => {
            debug!(stream = STREAM, "Stream already exists");
            Ok(stream)
        }
        Err(_) => {
            info!(stream = STREAM, "Creating stream");
            jetstream
                .create_stream(StreamConfig {
                    name: STREAM.to_string(),
                    subjects: vec![format!("{ROUTING_PREFIX}>")],
                    ..Default::default()
                })
                .await
                .map_err(nats_error("create stream"))
        }
    }
}

/// JetStream publisher; the subject is the event's routing key.
#[derive(Clone)]
pub struct NatsPublisher {
    jetstream: Context,
}

impl NatsPublisher {
    pub async fn connect(url: &str) -> TaskResult<Self> {
        let jetstream = connect(url).await?;
        ensure_stream(&jetstream).await?;
        Ok(Self { jetstream })
    }
}

#[async_trait]
impl ChangePublisher for NatsPublisher {
    #[instrument(skip(self, cancel, event), fields(event_type = %event.event_type(), task_id = %event.task_id()))]
    async fn publish(&self, cancel: &CancellationToken, event: &ChangeEvent) -> TaskResult<()> {
        let payload = event.encode()?;
        let subject = event.event_type().routing_key();

        let ack = run_cancellable(cancel, async {
            self.jetstream
                .publish(subject, payload.into())
                .await
                .map_err(nats_error("publish event"))?
                .await
                .map_err(nats_error("confirm event"))
        })
        .await?;

        debug!(sequence = ack.sequence, "Event published");
        Ok(())
    }
}

/// Durable pull consumer with explicit acks.
///
/// Messages stay in `in_flight` until they are settled.
pub struct NatsSubscriber {
    messages: MessageStream,
    in_flight: HashMap<String, Message>,
    local_ids: u64,
}

impl NatsSubscriber {
    pub async fn connect(url: &str, durable: &str) -> TaskResult<Self> {
        let jetstream = connect(url).await?;
        let stream = ensure_stream(&jetstream).await?;

        let consumer = match stream.get_consumer::<ConsumerConfig>(durable).await {
            Ok(consumer) => {
                debug!(consumer = %durable, "Consumer already exists");
                consumer
            }
            Err(_) => {
                info!(consumer = %durable, stream = STREAM, "Creating consumer");
                stream
                    .create_consumer(ConsumerConfig {
                        durable_name: Some(durable.to_string()),
                        name: Some(durable.to_string()),
                        ack_policy: AckPolicy::Explicit,
                        filter_subject: format!("{ROUTING_PREFIX}>"),
                        ..Default::default()
                    })
                    .await
                    .map_err(nats_error("create consumer"))?
            }
        };

        let messages = consumer
            .messages()
            .await
            .map_err(nats_error("open message stream"))?;

        Ok(Self {
            messages,
            in_flight: HashMap::new(),
            local_ids: 0,
        })
    }

    fn take(&mut self, delivery: &Delivery) -> TaskResult<Message> {
        self.in_flight.remove(&delivery.id).ok_or_else(|| {
            TaskError::invalid_argument(format!("delivery {} is not in flight", delivery.id))
        })
    }
}

#[async_trait]
impl ChangeSubscriber for NatsSubscriber {
    async fn receive(&mut self, cancel: &CancellationToken) -> TaskResult<Option<Delivery>> {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            next = self.messages.next() => next,
        };

        let message = match next {
            None => return Ok(None),
            Some(Err(e)) => return Err(TaskError::wrap(e, ErrorCode::Unknown, "receive message")),
            Some(Ok(message)) => message,
        };

        let id = match message.info() {
            Ok(info) => info.stream_sequence.to_string(),
            Err(e) => {
                warn!(error = %e, "Failed to read message info, using local id");
                self.local_ids += 1;
                format!("local-{}", self.local_ids)
            }
        };

        let delivery = Delivery {
            id: id.clone(),
            routing_key: message.subject.to_string(),
            payload: message.payload.to_vec(),
        };
        self.in_flight.insert(id, message);

        Ok(Some(delivery))
    }

    async fn ack(&mut self, cancel: &CancellationToken, delivery: &Delivery) -> TaskResult<()> {
        let message = self.take(delivery)?;
        run_cancellable(cancel, async {
            message.ack().await.map_err(nats_error("ack message"))
        })
        .await
    }

    async fn nack(&mut self, cancel: &CancellationToken, delivery: &Delivery) -> TaskResult<()> {
        let message = self.take(delivery)?;
        run_cancellable(cancel, async {
            message
                .ack_with(AckKind::Nak(None))
                .await
                .map_err(nats_error("nak message"))
        })
        .await
    }

    async fn close(&mut self) -> TaskResult<()> {
        if !self.in_flight.is_empty() {
            // Unsettled messages are redelivered after the ack wait expires.
            warn!(count = self.in_flight.len(), "Closing with unsettled messages");
            self.in_flight.clear();
        }
        info!("NATS subscription closed");
        Ok(())
    }
}
