use sea_orm_migration::sea_query::extension::postgres::Type;
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

const PRIORITIES: [TaskPriority; 4] = [
    TaskPriority::None,
    TaskPriority::Low,
    TaskPriority::Medium,
    TaskPriority::High,
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(TaskPriority::Enum)
                    .values(PRIORITIES)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Tasks::Table)
                    .if_not_exists()
                    .col(pk_uuid(Tasks::Id))
                    .col(text(Tasks::Description))
                    .col(
                        ColumnDef::new(Tasks::Priority)
                            .enumeration(TaskPriority::Enum, PRIORITIES)
                            .not_null()
                            .default("none"),
                    )
                    .col(timestamp_with_time_zone_null(Tasks::StartDate))
                    .col(timestamp_with_time_zone_null(Tasks::DueDate))
                    .col(boolean(Tasks::Done).default(false))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tasks_done")
                    .table(Tasks::Table)
                    .col(Tasks::Done)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tasks::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(TaskPriority::Enum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Tasks {
    Table,
    Id,
    Description,
    Priority,
    StartDate,
    DueDate,
    Done,
}

#[derive(DeriveIden, Clone, Copy)]
enum TaskPriority {
    #[sea_orm(iden = "task_priority")]
    Enum,
    #[sea_orm(iden = "none")]
    None,
    #[sea_orm(iden = "low")]
    Low,
    #[sea_orm(iden = "medium")]
    Medium,
    #[sea_orm(iden = "high")]
    High,
}
