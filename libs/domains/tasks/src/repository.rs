use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TaskResult;
use crate::models::{CreateParams, Task, UpdateParams};

/// Primary store for tasks, the single source of truth.
///
/// `find`, `update` and `delete` fail with `invalid_argument` for a malformed
/// id and `not_found` when no row matches; anything else is `unknown`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Allocate an id and persist the task; `is_done` starts as `false`
    async fn create(&self, cancel: &CancellationToken, params: CreateParams) -> TaskResult<Task>;

    async fn find(&self, cancel: &CancellationToken, id: &str) -> TaskResult<Task>;

    /// Replace every mutable field
    async fn update(
        &self,
        cancel: &CancellationToken,
        id: &str,
        params: UpdateParams,
    ) -> TaskResult<()>;

    async fn delete(&self, cancel: &CancellationToken, id: &str) -> TaskResult<()>;
}
