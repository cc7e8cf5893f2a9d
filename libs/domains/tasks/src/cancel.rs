use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::error::{TaskError, TaskResult};

/// Race `fut` against `cancel`; a cancelled token wins even when both are ready.
pub async fn run_cancellable<F, T>(cancel: &CancellationToken, fut: F) -> TaskResult<T>
where
    F: Future<Output = TaskResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TaskError::cancelled()),
        result = fut => result,
    }
}
