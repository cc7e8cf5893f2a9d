use crate::models::{Dates, Priority, Task};
use sea_orm::entity::prelude::*;

/// Sea-ORM entity for the `tasks` table
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub priority: Priority,
    pub start_date: Option<DateTimeWithTimeZone>,
    pub due_date: Option<DateTimeWithTimeZone>,
    pub done: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Task {
    fn from(model: Model) -> Self {
        Self {
            id: model.id.to_string(),
            description: model.description,
            priority: model.priority,
            dates: Dates {
                start: model.start_date.map(Into::into),
                due: model.due_date.map(Into::into),
            },
            is_done: model.done,
        }
    }
}
