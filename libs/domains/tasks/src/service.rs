use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use validator::Validate;

use crate::breaker::{BreakerState, CircuitBreaker};
use crate::bus::{ChangeEvent, ChangePublisher};
use crate::error::{TaskError, TaskResult};
use crate::models::{CreateParams, SearchParams, SearchResults, Task, UpdateParams};
use crate::repository::TaskStore;
use crate::search::TaskSearch;

pub const SERVICE_NOT_AVAILABLE: &str = "service not available";

/// Write and read coordination across the store, the search index and the bus.
///
/// The store is authoritative. Publishing is best-effort and never changes
/// the result of a write; it is skipped once the caller has cancelled.
pub struct TaskService<S, Q, P> {
    store: Arc<S>,
    search: Arc<Q>,
    publisher: Arc<P>,
    breaker: Arc<CircuitBreaker>,
}

impl<S, Q, P> Clone for TaskService<S, Q, P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            search: Arc::clone(&self.search),
            publisher: Arc::clone(&self.publisher),
            breaker: Arc::clone(&self.breaker),
        }
    }
}

impl<S, Q, P> TaskService<S, Q, P>
where
    S: TaskStore,
    Q: TaskSearch,
    P: ChangePublisher,
{
    pub fn new(store: S, search: Q, publisher: P, breaker: CircuitBreaker) -> Self {
        Self {
            store: Arc::new(store),
            search: Arc::new(search),
            publisher: Arc::new(publisher),
            breaker: Arc::new(breaker),
        }
    }

    /// Current state of the search breaker
    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    async fn publish(&self, cancel: &CancellationToken, event: ChangeEvent) {
        if cancel.is_cancelled() {
            debug!(event_type = %event.event_type(), "Caller cancelled, skipping publish");
            return;
        }
        if let Err(e) = self.publisher.publish(cancel, &event).await {
            warn!(
                event_type = %event.event_type(),
                task_id = %event.task_id(),
                error = %e.chain(),
                "Failed to publish change event"
            );
        }
    }

    /// Validate, persist, then announce the new task.
    #[instrument(skip(self, cancel, params))]
    pub async fn create(&self, cancel: &CancellationToken, params: CreateParams) -> TaskResult<Task> {
        params.validate().map_err(TaskError::validation)?;

        let task = self.store.create(cancel, params).await?;

        self.publish(cancel, ChangeEvent::Created(task.clone())).await;
        Ok(task)
    }

    /// Replace the mutable fields of a task.
    ///
    /// Succeeds once the store accepts the write; the follow-up read and
    /// publish are best-effort.
    #[instrument(skip(self, cancel, params), fields(task_id = %id))]
    pub async fn update(
        &self,
        cancel: &CancellationToken,
        id: &str,
        params: UpdateParams,
    ) -> TaskResult<()> {
        params.validate().map_err(TaskError::validation)?;

        self.store.update(cancel, id, params).await?;

        if cancel.is_cancelled() {
            return Ok(());
        }
        match self.store.find(cancel, id).await {
            Ok(task) => self.publish(cancel, ChangeEvent::Updated(task)).await,
            Err(e) => warn!(error = %e.chain(), "Post-update read failed, update not announced"),
        }
        Ok(())
    }

    #[instrument(skip(self, cancel), fields(task_id = %id))]
    pub async fn delete(&self, cancel: &CancellationToken, id: &str) -> TaskResult<()> {
        self.store.delete(cancel, id).await?;

        self.publish(cancel, ChangeEvent::Deleted { id: id.to_string() })
            .await;
        Ok(())
    }

    #[instrument(skip(self, cancel), fields(task_id = %id))]
    pub async fn find(&self, cancel: &CancellationToken, id: &str) -> TaskResult<Task> {
        self.store.find(cancel, id).await
    }

    /// Search through the breaker. The zero query never reaches the backend.
    #[instrument(skip(self, cancel, params))]
    pub async fn search(
        &self,
        cancel: &CancellationToken,
        params: SearchParams,
    ) -> TaskResult<SearchResults> {
        params.validate().map_err(TaskError::validation)?;

        if params.is_zero() {
            return Ok(SearchResults::default());
        }

        let Some(permit) = self.breaker.try_acquire() else {
            return Err(TaskError::unknown(SERVICE_NOT_AVAILABLE));
        };

        let result = self.search.search(cancel, &params).await;
        if cancel.is_cancelled() {
            // Our own cancellation says nothing about backend health.
            drop(permit);
        } else {
            permit.record(result.is_ok());
        }
        result
    }
}
