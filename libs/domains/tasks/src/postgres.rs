use async_trait::async_trait;
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    cancel::run_cancellable,
    entity,
    error::{ErrorCode, TaskError, TaskResult},
    models::{CreateParams, Task, UpdateParams},
    repository::TaskStore,
};

const TASK_NOT_FOUND: &str = "task not found";

/// PostgreSQL-backed [`TaskStore`]
#[derive(Clone)]
pub struct PgTaskStore {
    db: DatabaseConnection,
}

impl PgTaskStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn parse_id(id: &str) -> TaskResult<Uuid> {
    Uuid::parse_str(id)
        .map_err(|e| TaskError::wrap(e, ErrorCode::InvalidArgument, "invalid task id"))
}

fn db_error(operation: &'static str) -> impl FnOnce(DbErr) -> TaskError {
    move |err| TaskError::wrap(err, ErrorCode::Unknown, operation)
}

#[async_trait]
impl TaskStore for PgTaskStore {
    #[instrument(skip(self, cancel, params))]
    async fn create(&self, cancel: &CancellationToken, params: CreateParams) -> TaskResult<Task> {
        let model = entity::ActiveModel {
            id: Set(Uuid::new_v4()),
            description: Set(params.description),
            priority: Set(params.priority),
            start_date: Set(params.dates.start.map(Into::into)),
            due_date: Set(params.dates.due.map(Into::into)),
            done: Set(false),
        };

        let model = run_cancellable(cancel, async {
            model.insert(&self.db).await.map_err(db_error("insert task"))
        })
        .await?;

        info!(task_id = %model.id, "Created task");
        Ok(model.into())
    }

    #[instrument(skip(self, cancel), fields(task_id = %id))]
    async fn find(&self, cancel: &CancellationToken, id: &str) -> TaskResult<Task> {
        let id = parse_id(id)?;

        let model = run_cancellable(cancel, async {
            entity::Entity::find_by_id(id)
                .one(&self.db)
                .await
                .map_err(db_error("select task"))
        })
        .await?;

        model
            .map(Into::into)
            .ok_or_else(|| TaskError::not_found(TASK_NOT_FOUND))
    }

    #[instrument(skip(self, cancel, params), fields(task_id = %id))]
    async fn update(
        &self,
        cancel: &CancellationToken,
        id: &str,
        params: UpdateParams,
    ) -> TaskResult<()> {
        let id = parse_id(id)?;

        let changes = entity::ActiveModel {
            id: NotSet,
            description: Set(params.description),
            priority: Set(params.priority),
            start_date: Set(params.dates.start.map(Into::into)),
            due_date: Set(params.dates.due.map(Into::into)),
            done: Set(params.is_done),
        };

        let result = run_cancellable(cancel, async {
            entity::Entity::update_many()
                .set(changes)
                .filter(entity::Column::Id.eq(id))
                .exec(&self.db)
                .await
                .map_err(db_error("update task"))
        })
        .await?;

        if result.rows_affected == 0 {
            return Err(TaskError::not_found(TASK_NOT_FOUND));
        }

        info!(task_id = %id, "Updated task");
        Ok(())
    }

    #[instrument(skip(self, cancel), fields(task_id = %id))]
    async fn delete(&self, cancel: &CancellationToken, id: &str) -> TaskResult<()> {
        let id = parse_id(id)?;

        let result = run_cancellable(cancel, async {
            entity::Entity::delete_by_id(id)
                .exec(&self.db)
                .await
                .map_err(db_error("delete task"))
        })
        .await?;

        if result.rows_affected == 0 {
            return Err(TaskError::not_found(TASK_NOT_FOUND));
        }

        info!(task_id = %id, "Deleted task");
        Ok(())
    }
}
