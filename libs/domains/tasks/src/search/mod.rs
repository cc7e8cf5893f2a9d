//! Search read model over tasks.

mod elasticsearch;

pub use elasticsearch::ElasticsearchTaskSearch;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::TaskResult;
use crate::models::{Dates, Priority, SearchParams, SearchResults, Task};

/// Secondary, eventually consistent index of tasks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskSearch: Send + Sync {
    /// Upsert by `task.id`
    async fn index(&self, cancel: &CancellationToken, task: &Task) -> TaskResult<()>;

    /// Remove by id; removing a missing document succeeds
    async fn delete(&self, cancel: &CancellationToken, id: &str) -> TaskResult<()>;

    /// Multi-predicate query. The zero query returns empty results without
    /// touching the backend.
    async fn search(
        &self,
        cancel: &CancellationToken,
        params: &SearchParams,
    ) -> TaskResult<SearchResults>;
}

/// Indexed form of a task; dates are nanoseconds since the epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDocument {
    pub id: String,
    pub description: String,
    pub priority: Priority,
    pub is_done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_due: Option<i64>,
}

impl From<&Task> for TaskDocument {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            description: task.description.clone(),
            priority: task.priority,
            is_done: task.is_done,
            date_start: task.dates.start.and_then(|d| d.timestamp_nanos_opt()),
            date_due: task.dates.due.and_then(|d| d.timestamp_nanos_opt()),
        }
    }
}

impl From<TaskDocument> for Task {
    fn from(doc: TaskDocument) -> Self {
        Self {
            id: doc.id,
            description: doc.description,
            priority: doc.priority,
            dates: Dates {
                start: doc.date_start.map(DateTime::<Utc>::from_timestamp_nanos),
                due: doc.date_due.map(DateTime::<Utc>::from_timestamp_nanos),
            },
            is_done: doc.is_done,
        }
    }
}
