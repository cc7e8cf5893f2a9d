use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use axum_helpers::{AppJson, ErrorResponse, RequestCancellation};
use serde_json::json;
use std::sync::Arc;
use utoipa::OpenApi;

use crate::bus::ChangePublisher;
use crate::error::TaskResult;
use crate::models::{
    CreateParams, Dates, Priority, SearchParams, SearchResults, Task, TaskEnvelope, UpdateParams,
};
use crate::repository::TaskStore;
use crate::search::TaskSearch;
use crate::service::TaskService;

/// OpenAPI document for the tasks API
#[derive(OpenApi)]
#[openapi(
    info(title = "ToDo API", description = "Create, read, update, delete and search tasks"),
    paths(create_task, find_task, update_task, delete_task, search_tasks),
    components(schemas(
        Task,
        Priority,
        Dates,
        CreateParams,
        UpdateParams,
        SearchParams,
        SearchResults,
        TaskEnvelope,
        ErrorResponse
    )),
    tags((name = "tasks", description = "Task operations"))
)]
pub struct TasksApiDoc;

type SharedService<S, Q, P> = State<Arc<TaskService<S, Q, P>>>;

/// Routes for `/tasks` and `/search/tasks`
pub fn router<S, Q, P>(service: TaskService<S, Q, P>) -> Router
where
    S: TaskStore + 'static,
    Q: TaskSearch + 'static,
    P: ChangePublisher + 'static,
{
    Router::new()
        .route("/tasks", post(create_task::<S, Q, P>))
        .route(
            "/tasks/{id}",
            get(find_task::<S, Q, P>)
                .put(update_task::<S, Q, P>)
                .delete(delete_task::<S, Q, P>),
        )
        .route("/search/tasks", post(search_tasks::<S, Q, P>))
        .with_state(Arc::new(service))
}

/// Create a task
#[utoipa::path(
    post,
    path = "/tasks",
    tag = "tasks",
    request_body = CreateParams,
    responses(
        (status = 201, description = "Task created", body = TaskEnvelope),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
pub async fn create_task<S, Q, P>(
    State(service): SharedService<S, Q, P>,
    cancel: RequestCancellation,
    AppJson(params): AppJson<CreateParams>,
) -> TaskResult<impl IntoResponse>
where
    S: TaskStore,
    Q: TaskSearch,
    P: ChangePublisher,
{
    let task = service.create(cancel.token(), params).await?;
    Ok((StatusCode::CREATED, Json(TaskEnvelope { task })))
}

/// Get a task by id
#[utoipa::path(
    get,
    path = "/tasks/{id}",
    tag = "tasks",
    params(("id" = String, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task found", body = TaskEnvelope),
        (status = 400, description = "Malformed id", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
pub async fn find_task<S, Q, P>(
    State(service): SharedService<S, Q, P>,
    cancel: RequestCancellation,
    Path(id): Path<String>,
) -> TaskResult<impl IntoResponse>
where
    S: TaskStore,
    Q: TaskSearch,
    P: ChangePublisher,
{
    let task = service.find(cancel.token(), &id).await?;
    Ok(Json(TaskEnvelope { task }))
}

/// Replace a task's mutable fields
#[utoipa::path(
    put,
    path = "/tasks/{id}",
    tag = "tasks",
    params(("id" = String, Path, description = "Task id")),
    request_body = UpdateParams,
    responses(
        (status = 200, description = "Task updated"),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
pub async fn update_task<S, Q, P>(
    State(service): SharedService<S, Q, P>,
    cancel: RequestCancellation,
    Path(id): Path<String>,
    AppJson(params): AppJson<UpdateParams>,
) -> TaskResult<impl IntoResponse>
where
    S: TaskStore,
    Q: TaskSearch,
    P: ChangePublisher,
{
    service.update(cancel.token(), &id, params).await?;
    Ok(Json(json!({})))
}

/// Delete a task
#[utoipa::path(
    delete,
    path = "/tasks/{id}",
    tag = "tasks",
    params(("id" = String, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task deleted"),
        (status = 404, description = "Task not found", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
pub async fn delete_task<S, Q, P>(
    State(service): SharedService<S, Q, P>,
    cancel: RequestCancellation,
    Path(id): Path<String>,
) -> TaskResult<impl IntoResponse>
where
    S: TaskStore,
    Q: TaskSearch,
    P: ChangePublisher,
{
    service.delete(cancel.token(), &id).await?;
    Ok(Json(json!({})))
}

/// Search tasks by description, priority and completion
#[utoipa::path(
    post,
    path = "/search/tasks",
    tag = "tasks",
    request_body = SearchParams,
    responses(
        (status = 200, description = "Matching tasks", body = SearchResults),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Internal error or search unavailable", body = ErrorResponse)
    )
)]
pub async fn search_tasks<S, Q, P>(
    State(service): SharedService<S, Q, P>,
    cancel: RequestCancellation,
    AppJson(params): AppJson<SearchParams>,
) -> TaskResult<impl IntoResponse>
where
    S: TaskStore,
    Q: TaskSearch,
    P: ChangePublisher,
{
    let results = service.search(cancel.token(), params).await?;
    Ok(Json(results))
}
