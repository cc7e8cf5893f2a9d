//! Projects change events from the bus onto the search index.
//!
//! Each message moves `received -> decoded -> applied -> acked`; any step may
//! end in `nacked` instead. A failing message never stops the loop.

use std::time::Duration;
use strum::IntoStaticStr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::bus::{ChangeEvent, ChangeSubscriber, Delivery};
use crate::error::TaskResult;
use crate::search::TaskSearch;

pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const RECEIVE_BACKOFF: Duration = Duration::from_secs(1);

/// Final state of one message
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    /// Applied to the index and acknowledged
    Acked,
    /// Index write failed; redelivery requested
    Nacked,
    /// Undecodable or unknown event type
    Rejected,
    /// Settling the message with the bus failed
    SettleFailed,
}

pub struct TaskIndexer<Q> {
    search: Q,
    drain_timeout: Duration,
}

impl<Q: TaskSearch> TaskIndexer<Q> {
    pub fn new(search: Q) -> Self {
        Self {
            search,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Consume until `shutdown` fires, then give the in-flight message up to
    /// the drain timeout and close the subscription.
    pub async fn run<B>(&self, subscriber: &mut B, shutdown: CancellationToken) -> TaskResult<()>
    where
        B: ChangeSubscriber,
    {
        info!(drain_timeout = ?self.drain_timeout, "Indexer started");
        // In-flight work never observes `shutdown`. Only the drain deadline bounds it.
        let in_flight = CancellationToken::new();

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = subscriber.receive(&shutdown) => received,
            };

            let delivery = match received {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    if !shutdown.is_cancelled() {
                        warn!("Subscription ended");
                    }
                    break;
                }
                Err(e) => {
                    warn!(error = %e.chain(), "Receive failed, backing off");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RECEIVE_BACKOFF) => continue,
                    }
                }
            };

            let processing = self.process(subscriber, &in_flight, delivery);
            tokio::pin!(processing);

            tokio::select! {
                outcome = &mut processing => record(outcome),
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, draining in-flight message");
                    // Dropping `processing` past the deadline aborts the message.
                    match tokio::time::timeout(self.drain_timeout, &mut processing).await {
                        Ok(outcome) => record(outcome),
                        Err(_) => warn!("Drain deadline passed, message left unsettled"),
                    }
                    break;
                }
            }
        }

        subscriber.close().await?;
        info!("Indexer stopped");
        Ok(())
    }

    /// Decode, apply and settle one message.
    #[instrument(skip_all, fields(delivery_id = %delivery.id, routing_key = %delivery.routing_key))]
    pub async fn process<B>(
        &self,
        subscriber: &mut B,
        cancel: &CancellationToken,
        delivery: Delivery,
    ) -> Outcome
    where
        B: ChangeSubscriber,
    {
        let event = match ChangeEvent::decode(&delivery.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Rejecting undecodable message");
                return settle(subscriber, cancel, &delivery, false, Outcome::Rejected).await;
            }
        };

        let applied = match &event {
            ChangeEvent::Created(task) | ChangeEvent::Updated(task) => {
                self.search.index(cancel, task).await
            }
            ChangeEvent::Deleted { id } => self.search.delete(cancel, id).await,
        };

        match applied {
            Ok(()) => {
                debug!(event_type = %event.event_type(), task_id = %event.task_id(), "Event applied");
                settle(subscriber, cancel, &delivery, true, Outcome::Acked).await
            }
            Err(e) => {
                warn!(
                    event_type = %event.event_type(),
                    task_id = %event.task_id(),
                    error = %e.chain(),
                    "Index update failed"
                );
                settle(subscriber, cancel, &delivery, false, Outcome::Nacked).await
            }
        }
    }
}

async fn settle<B: ChangeSubscriber>(
    subscriber: &mut B,
    cancel: &CancellationToken,
    delivery: &Delivery,
    ack: bool,
    outcome: Outcome,
) -> Outcome {
    let result = if ack {
        subscriber.ack(cancel, delivery).await
    } else {
        subscriber.nack(cancel, delivery).await
    };

    match result {
        Ok(()) => outcome,
        Err(e) => {
            warn!(ack, error = %e.chain(), "Failed to settle message");
            Outcome::SettleFailed
        }
    }
}

fn record(outcome: Outcome) {
    let label: &'static str = outcome.into();
    metrics::counter!("indexer_messages_total", "outcome" => label).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{EventType, MockChangeSubscriber};
    use crate::error::TaskError;
    use crate::models::{Dates, Priority, SearchParams, SearchResults, Task};
    use crate::search::MockTaskSearch;
    use async_trait::async_trait;
    use mockall::Sequence;
    use std::time::Instant;

    /// Index writes that take `delay` to complete.
    struct SlowSearch {
        delay: Duration,
    }

    #[async_trait]
    impl TaskSearch for SlowSearch {
        async fn index(&self, _cancel: &CancellationToken, _task: &Task) -> TaskResult<()> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        async fn delete(&self, _cancel: &CancellationToken, _id: &str) -> TaskResult<()> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        async fn search(
            &self,
            _cancel: &CancellationToken,
            _params: &SearchParams,
        ) -> TaskResult<SearchResults> {
            unreachable!("the indexer never searches")
        }
    }

    fn single_delivery_subscriber() -> MockChangeSubscriber {
        let mut subscriber = MockChangeSubscriber::new();
        subscriber
            .expect_receive()
            .times(1)
            .returning(|_| Ok(Some(delivery(&ChangeEvent::Created(task())))));
        subscriber.expect_nack().times(0);
        subscriber.expect_close().times(1).returning(|| Ok(()));
        subscriber
    }

    fn cancel_after(shutdown: &CancellationToken, after: Duration) {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            shutdown.cancel();
        });
    }

    fn task() -> Task {
        Task {
            id: "abc".to_string(),
            description: "Sleep early".to_string(),
            priority: Priority::Low,
            dates: Dates::default(),
            is_done: false,
        }
    }

    fn delivery(event: &ChangeEvent) -> Delivery {
        Delivery {
            id: "1".to_string(),
            routing_key: event.event_type().routing_key().to_string(),
            payload: event.encode().unwrap(),
        }
    }

    fn raw_delivery(payload: &[u8]) -> Delivery {
        Delivery {
            id: "1".to_string(),
            routing_key: EventType::Created.routing_key().to_string(),
            payload: payload.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_created_event_is_indexed_and_acked() {
        let mut search = MockTaskSearch::new();
        search
            .expect_index()
            .withf(|_, task| task.id == "abc")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut subscriber = MockChangeSubscriber::new();
        subscriber.expect_ack().times(1).returning(|_, _| Ok(()));
        subscriber.expect_nack().times(0);

        let indexer = TaskIndexer::new(search);
        let outcome = indexer
            .process(
                &mut subscriber,
                &CancellationToken::new(),
                delivery(&ChangeEvent::Created(task())),
            )
            .await;
        assert_eq!(outcome, Outcome::Acked);
    }

    #[tokio::test]
    async fn test_deleted_event_removes_document() {
        let mut search = MockTaskSearch::new();
        search
            .expect_delete()
            .withf(|_, id| id == "abc")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut subscriber = MockChangeSubscriber::new();
        subscriber.expect_ack().times(1).returning(|_, _| Ok(()));

        let indexer = TaskIndexer::new(search);
        let outcome = indexer
            .process(
                &mut subscriber,
                &CancellationToken::new(),
                delivery(&ChangeEvent::Deleted {
                    id: "abc".to_string(),
                }),
            )
            .await;
        assert_eq!(outcome, Outcome::Acked);
    }

    #[tokio::test]
    async fn test_index_failure_is_nacked() {
        let mut search = MockTaskSearch::new();
        search
            .expect_index()
            .returning(|_, _| Err(TaskError::unknown("search backend down")));

        let mut subscriber = MockChangeSubscriber::new();
        subscriber.expect_ack().times(0);
        subscriber.expect_nack().times(1).returning(|_, _| Ok(()));

        let indexer = TaskIndexer::new(search);
        let outcome = indexer
            .process(
                &mut subscriber,
                &CancellationToken::new(),
                delivery(&ChangeEvent::Updated(task())),
            )
            .await;
        assert_eq!(outcome, Outcome::Nacked);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_events_are_rejected() {
        let mut search = MockTaskSearch::new();
        search.expect_index().times(0);
        search.expect_delete().times(0);

        let mut subscriber = MockChangeSubscriber::new();
        subscriber.expect_nack().times(2).returning(|_, _| Ok(()));

        let indexer = TaskIndexer::new(search);
        let cancel = CancellationToken::new();

        let unknown = raw_delivery(br#"{"type":"task.archived","value":{"id":"abc"}}"#);
        assert_eq!(
            indexer.process(&mut subscriber, &cancel, unknown).await,
            Outcome::Rejected
        );

        let garbage = raw_delivery(b"\x00\x01");
        assert_eq!(
            indexer.process(&mut subscriber, &cancel, garbage).await,
            Outcome::Rejected
        );
    }

    #[tokio::test]
    async fn test_run_processes_until_subscription_ends() {
        let mut seq = Sequence::new();
        let mut subscriber = MockChangeSubscriber::new();
        subscriber
            .expect_receive()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(delivery(&ChangeEvent::Created(task())))));
        subscriber
            .expect_ack()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        subscriber
            .expect_receive()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(TaskError::unknown("connection reset")));
        subscriber
            .expect_receive()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        subscriber
            .expect_close()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let mut search = MockTaskSearch::new();
        search.expect_index().times(1).returning(|_, _| Ok(()));

        let indexer = TaskIndexer::new(search);
        indexer
            .run(&mut subscriber, CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_and_closes() {
        let mut subscriber = MockChangeSubscriber::new();
        // The receive future may be built before the shutdown branch wins.
        subscriber.expect_receive().returning(|_| Ok(None));
        subscriber.expect_ack().times(0);
        subscriber.expect_close().times(1).returning(|| Ok(()));

        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let indexer = TaskIndexer::new(MockTaskSearch::new());
        indexer.run(&mut subscriber, shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_message() {
        let mut subscriber = single_delivery_subscriber();
        subscriber.expect_ack().times(1).returning(|_, _| Ok(()));

        let indexer = TaskIndexer::new(SlowSearch {
            delay: Duration::from_millis(150),
        })
        .with_drain_timeout(Duration::from_secs(2));

        let shutdown = CancellationToken::new();
        cancel_after(&shutdown, Duration::from_millis(20));

        indexer.run(&mut subscriber, shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_deadline_abandons_slow_message() {
        let mut subscriber = single_delivery_subscriber();
        subscriber.expect_ack().times(0);

        let indexer = TaskIndexer::new(SlowSearch {
            delay: Duration::from_secs(30),
        })
        .with_drain_timeout(Duration::from_millis(100));

        let shutdown = CancellationToken::new();
        cancel_after(&shutdown, Duration::from_millis(20));

        let started = Instant::now();
        tokio::time::timeout(Duration::from_secs(5), indexer.run(&mut subscriber, shutdown))
            .await
            .expect("run should return once the drain deadline passes")
            .unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100), "returned after {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "returned after {elapsed:?}");
    }
}
