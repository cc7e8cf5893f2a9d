use async_trait::async_trait;
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{TaskDocument, TaskSearch};
use crate::cancel::run_cancellable;
use crate::error::{ErrorCode, TaskError, TaskResult};
use crate::models::{SearchParams, SearchResults, Task};

pub const DEFAULT_INDEX: &str = "tasks";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Elasticsearch-backed [`TaskSearch`] speaking the REST API directly.
///
/// Every request is bounded by the client timeout, so a backend that stops
/// answering surfaces as an `unknown` error instead of a hung call.
#[derive(Clone)]
pub struct ElasticsearchTaskSearch {
    client: reqwest::Client,
    base_url: Url,
    index: String,
}

impl ElasticsearchTaskSearch {
    pub fn new(base_url: &str, timeout: Duration) -> TaskResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            TaskError::wrap(e, ErrorCode::InvalidArgument, "invalid search endpoint")
        })?;
        if base_url.cannot_be_a_base() {
            return Err(TaskError::invalid_argument("invalid search endpoint"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(request_error("build search client"))?;

        Ok(Self {
            client,
            base_url,
            index: DEFAULT_INDEX.to_string(),
        })
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    /// `<base>/<index>/<segments...>`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> TaskResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| TaskError::invalid_argument("invalid search endpoint"))?
            .pop_if_empty()
            .push(&self.index)
            .extend(segments);
        Ok(url)
    }

    fn index_url(&self) -> TaskResult<Url> {
        self.url(&[])
    }

    fn doc_url(&self, id: &str) -> TaskResult<Url> {
        self.url(&["_doc", id])
    }

    /// Create the index with the task mapping unless it already exists.
    #[instrument(skip(self, cancel), fields(index = %self.index))]
    pub async fn ensure_index(&self, cancel: &CancellationToken) -> TaskResult<()> {
        let index_url = self.index_url()?;
        let exists = run_cancellable(cancel, async {
            self.client
                .head(index_url.clone())
                .send()
                .await
                .map_err(request_error("check index"))
        })
        .await?;

        match exists.status() {
            StatusCode::OK => {
                debug!("Search index already exists");
                return Ok(());
            }
            StatusCode::NOT_FOUND => {}
            status => {
                return Err(TaskError::unknown(format!(
                    "check index failed with status {status}"
                )));
            }
        }

        let response = run_cancellable(cancel, async {
            self.client
                .put(index_url)
                .json(&index_mapping())
                .send()
                .await
                .map_err(request_error("create index"))
        })
        .await?;

        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            if body.contains("resource_already_exists_exception") {
                return Ok(());
            }
            return Err(TaskError::unknown(format!("create index rejected: {body}")));
        }

        ensure_success(response, "create index").await?;
        info!("Created search index");
        Ok(())
    }
}

fn request_error(operation: &'static str) -> impl FnOnce(reqwest::Error) -> TaskError {
    move |err| TaskError::wrap(err, ErrorCode::Unknown, operation)
}

async fn ensure_success(response: Response, operation: &str) -> TaskResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(status = %status, body = %body, operation, "Search backend request failed");
    Err(TaskError::unknown(format!(
        "{operation} failed with status {status}"
    )))
}

fn index_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "description": { "type": "text" },
                "priority": { "type": "keyword" },
                "is_done": { "type": "boolean" },
                "date_start": { "type": "long" },
                "date_due": { "type": "long" }
            }
        }
    })
}

/// Boolean `should` query over the present predicates, ranked by score with
/// `id` as a stable tie-break.
pub(crate) fn build_query(params: &SearchParams) -> Value {
    let mut should = Vec::new();

    if let Some(description) = params.description_query() {
        should.push(json!({ "match": { "description": description } }));
    }
    if let Some(priority) = params.priority {
        should.push(json!({ "term": { "priority": priority.to_string() } }));
    }
    if let Some(is_done) = params.is_done {
        should.push(json!({ "term": { "is_done": is_done } }));
    }

    json!({
        "query": {
            "bool": {
                "should": should,
                "minimum_should_match": 1
            }
        },
        "sort": [
            { "_score": { "order": "desc" } },
            { "id": { "order": "asc" } }
        ],
        "track_total_hits": true,
        "from": params.from,
        "size": params.size
    })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    total: HitsTotal,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct HitsTotal {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: TaskDocument,
}

impl From<SearchResponse> for SearchResults {
    fn from(response: SearchResponse) -> Self {
        Self {
            total: response.hits.total.value,
            tasks: response
                .hits
                .hits
                .into_iter()
                .map(|hit| Task::from(hit.source))
                .collect(),
        }
    }
}

#[async_trait]
impl TaskSearch for ElasticsearchTaskSearch {
    #[instrument(skip(self, cancel, task), fields(task_id = %task.id))]
    async fn index(&self, cancel: &CancellationToken, task: &Task) -> TaskResult<()> {
        let document = TaskDocument::from(task);
        let url = self.doc_url(&task.id)?;

        let response = run_cancellable(cancel, async {
            self.client
                .put(url)
                .json(&document)
                .send()
                .await
                .map_err(request_error("index task"))
        })
        .await?;

        ensure_success(response, "index task").await?;
        debug!("Indexed task");
        Ok(())
    }

    #[instrument(skip(self, cancel), fields(task_id = %id))]
    async fn delete(&self, cancel: &CancellationToken, id: &str) -> TaskResult<()> {
        let url = self.doc_url(id)?;
        let response = run_cancellable(cancel, async {
            self.client
                .delete(url)
                .send()
                .await
                .map_err(request_error("delete task"))
        })
        .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Task was not indexed");
            return Ok(());
        }

        ensure_success(response, "delete task").await?;
        debug!("Removed task from index");
        Ok(())
    }

    #[instrument(skip(self, cancel, params))]
    async fn search(
        &self,
        cancel: &CancellationToken,
        params: &SearchParams,
    ) -> TaskResult<SearchResults> {
        if params.is_zero() {
            return Ok(SearchResults::default());
        }

        let query = build_query(params);
        let url = self.url(&["_search"])?;

        let response = run_cancellable(cancel, async {
            self.client
                .post(url)
                .json(&query)
                .send()
                .await
                .map_err(request_error("search tasks"))
        })
        .await?;

        let response = ensure_success(response, "search tasks").await?;
        let body: SearchResponse = run_cancellable(cancel, async {
            response
                .json()
                .await
                .map_err(request_error("decode search response"))
        })
        .await?;

        Ok(body.into())
    }
}
