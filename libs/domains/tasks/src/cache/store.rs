use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::{KeyValueCache, get_json, invalidate, set_json, task_key};
use crate::error::TaskResult;
use crate::models::{CreateParams, Task, UpdateParams};
use crate::repository::TaskStore;

/// Point cache in front of a [`TaskStore`].
///
/// Creates write through, finds are cache-aside, deletes invalidate and
/// updates invalidate before refreshing from the store.
pub struct CachedTaskStore<S, C> {
    store: S,
    cache: C,
}

impl<S, C> CachedTaskStore<S, C> {
    pub fn new(store: S, cache: C) -> Self {
        Self { store, cache }
    }
}

#[async_trait]
impl<S, C> TaskStore for CachedTaskStore<S, C>
where
    S: TaskStore,
    C: KeyValueCache,
{
    async fn create(&self, cancel: &CancellationToken, params: CreateParams) -> TaskResult<Task> {
        let task = self.store.create(cancel, params).await?;
        if !cancel.is_cancelled() {
            set_json(&self.cache, cancel, &task_key(&task.id), &task, None).await;
        }
        Ok(task)
    }

    #[instrument(skip(self, cancel), fields(task_id = %id))]
    async fn find(&self, cancel: &CancellationToken, id: &str) -> TaskResult<Task> {
        let key = task_key(id);
        if let Some(task) = get_json::<_, Task>(&self.cache, cancel, &key).await {
            debug!("Point cache hit");
            return Ok(task);
        }

        let task = self.store.find(cancel, id).await?;
        set_json(&self.cache, cancel, &key, &task, None).await;
        Ok(task)
    }

    #[instrument(skip(self, cancel, params), fields(task_id = %id))]
    async fn update(
        &self,
        cancel: &CancellationToken,
        id: &str,
        params: UpdateParams,
    ) -> TaskResult<()> {
        self.store.update(cancel, id, params).await?;

        // The row has changed: the stale entry goes even if the caller gave up.
        let key = task_key(id);
        invalidate(&self.cache, &CancellationToken::new(), &key).await;

        if cancel.is_cancelled() {
            return Ok(());
        }

        match self.store.find(cancel, id).await {
            Ok(task) => set_json(&self.cache, cancel, &key, &task, None).await,
            Err(e) => warn!(error = %e.chain(), "Post-update refresh failed, entry stays invalidated"),
        }
        Ok(())
    }

    #[instrument(skip(self, cancel), fields(task_id = %id))]
    async fn delete(&self, cancel: &CancellationToken, id: &str) -> TaskResult<()> {
        self.store.delete(cancel, id).await?;
        invalidate(&self.cache, &CancellationToken::new(), &task_key(id)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MockKeyValueCache;
    use crate::cache::memory::MemoryCache;
    use crate::error::{ErrorCode, TaskError};
    use crate::models::{Dates, Priority};
    use crate::repository::MockTaskStore;

    const ID: &str = "7d3c1a8e-0000-4000-8000-000000000001";

    fn task(description: &str) -> Task {
        Task {
            id: ID.to_string(),
            description: description.to_string(),
            priority: Priority::Low,
            dates: Dates::default(),
            is_done: false,
        }
    }

    fn create_params() -> CreateParams {
        CreateParams {
            description: "Sleep early".to_string(),
            priority: Priority::Low,
            dates: Dates::default(),
        }
    }

    #[tokio::test]
    async fn test_create_writes_through() {
        let mut store = MockTaskStore::new();
        store
            .expect_create()
            .times(1)
            .returning(|_, _| Ok(task("Sleep early")));
        store.expect_find().times(0);

        let cached = CachedTaskStore::new(store, MemoryCache::default());
        let cancel = CancellationToken::new();

        let created = cached.create(&cancel, create_params()).await.unwrap();
        let found = cached.find(&cancel, &created.id).await.unwrap();
        assert_eq!(found, created);
    }

    #[tokio::test]
    async fn test_find_is_cache_aside() {
        let mut store = MockTaskStore::new();
        store
            .expect_find()
            .times(1)
            .returning(|_, _| Ok(task("Sleep early")));

        let cached = CachedTaskStore::new(store, MemoryCache::default());
        let cancel = CancellationToken::new();

        cached.find(&cancel, ID).await.unwrap();
        cached.find(&cancel, ID).await.unwrap();
        assert!(cached.cache.contains(&task_key(ID)));
    }

    #[tokio::test]
    async fn test_update_replaces_stale_entry() {
        let mut store = MockTaskStore::new();
        store.expect_update().times(1).returning(|_, _, _| Ok(()));
        store
            .expect_find()
            .times(1)
            .returning(|_, _| Ok(task("Sleep early...")));

        let cache = MemoryCache::default();
        let cancel = CancellationToken::new();
        set_json(&cache, &cancel, &task_key(ID), &task("Sleep early"), None).await;

        let cached = CachedTaskStore::new(store, cache);
        cached
            .update(&cancel, ID, UpdateParams::default())
            .await
            .unwrap();

        let entry: Task = cached.cache.value(&task_key(ID)).unwrap();
        assert_eq!(entry.description, "Sleep early...");
    }

    #[tokio::test]
    async fn test_update_succeeds_when_refresh_fails() {
        let mut store = MockTaskStore::new();
        store.expect_update().times(1).returning(|_, _, _| Ok(()));
        store
            .expect_find()
            .times(1)
            .returning(|_, _| Err(TaskError::unknown("connection reset")));

        let cache = MemoryCache::default();
        let cancel = CancellationToken::new();
        set_json(&cache, &cancel, &task_key(ID), &task("Sleep early"), None).await;

        let cached = CachedTaskStore::new(store, cache);
        cached
            .update(&cancel, ID, UpdateParams::default())
            .await
            .unwrap();

        assert!(!cached.cache.contains(&task_key(ID)));
    }

    #[tokio::test]
    async fn test_failed_update_leaves_cache_alone() {
        let mut store = MockTaskStore::new();
        store
            .expect_update()
            .times(1)
            .returning(|_, _, _| Err(TaskError::not_found("task not found")));

        let mut cache = MockKeyValueCache::new();
        cache.expect_delete().times(0);
        cache.expect_set().times(0);

        let cached = CachedTaskStore::new(store, cache);
        let err = cached
            .update(&CancellationToken::new(), ID, UpdateParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_delete_invalidates() {
        let mut store = MockTaskStore::new();
        store.expect_delete().times(1).returning(|_, _| Ok(()));

        let cache = MemoryCache::default();
        let cancel = CancellationToken::new();
        set_json(&cache, &cancel, &task_key(ID), &task("Sleep early"), None).await;

        let cached = CachedTaskStore::new(store, cache);
        cached.delete(&cancel, ID).await.unwrap();
        assert!(!cached.cache.contains(&task_key(ID)));
    }

    #[tokio::test]
    async fn test_cache_failures_fall_through() {
        let mut store = MockTaskStore::new();
        store
            .expect_find()
            .times(1)
            .returning(|_, _| Ok(task("Sleep early")));

        let mut cache = MockKeyValueCache::new();
        cache
            .expect_get()
            .returning(|_, _| Err(TaskError::unknown("redis down")));
        cache
            .expect_set()
            .returning(|_, _, _, _| Err(TaskError::unknown("redis down")));

        let cached = CachedTaskStore::new(store, cache);
        let found = cached.find(&CancellationToken::new(), ID).await.unwrap();
        assert_eq!(found.description, "Sleep early");
    }
}
