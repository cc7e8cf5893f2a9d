use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{KeyValueCache, get_json, search_key, set_json};
use crate::error::TaskResult;
use crate::models::{SearchParams, SearchResults, Task};
use crate::search::TaskSearch;

pub const DEFAULT_SEARCH_TTL: Duration = Duration::from_secs(25);

/// Short-lived cache of result pages keyed by the canonical query.
///
/// Index writes pass through untouched; stale pages age out with the TTL.
pub struct CachedTaskSearch<Q, C> {
    search: Q,
    cache: C,
    ttl: Duration,
}

impl<Q, C> CachedTaskSearch<Q, C> {
    pub fn new(search: Q, cache: C) -> Self {
        Self {
            search,
            cache,
            ttl: DEFAULT_SEARCH_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[async_trait]
impl<Q, C> TaskSearch for CachedTaskSearch<Q, C>
where
    Q: TaskSearch,
    C: KeyValueCache,
{
    async fn index(&self, cancel: &CancellationToken, task: &Task) -> TaskResult<()> {
        self.search.index(cancel, task).await
    }

    async fn delete(&self, cancel: &CancellationToken, id: &str) -> TaskResult<()> {
        self.search.delete(cancel, id).await
    }

    #[instrument(skip(self, cancel, params))]
    async fn search(
        &self,
        cancel: &CancellationToken,
        params: &SearchParams,
    ) -> TaskResult<SearchResults> {
        let key = search_key(&params.cache_key());
        if let Some(results) = get_json::<_, SearchResults>(&self.cache, cancel, &key).await {
            debug!("Search cache hit");
            return Ok(results);
        }

        let results = self.search.search(cancel, params).await?;
        if !cancel.is_cancelled() {
            set_json(&self.cache, cancel, &key, &results, Some(self.ttl)).await;
        }
        Ok(results)
    }
}
