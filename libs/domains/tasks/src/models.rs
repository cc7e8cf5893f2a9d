use chrono::{DateTime, Utc};
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// Task priority levels, ordered `none < low < medium < high`
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    Default,
    DeriveActiveEnum,
    EnumIter,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "task_priority")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    #[default]
    #[sea_orm(string_value = "none")]
    None,
    #[sea_orm(string_value = "low")]
    Low,
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "high")]
    High,
}

/// Optional start/due window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_window"))]
pub struct Dates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<DateTime<Utc>>,
}

fn validate_window(dates: &Dates) -> Result<(), ValidationError> {
    match (dates.start, dates.due) {
        (Some(start), Some(due)) if start > due => Err(ValidationError::new("date_window")
            .with_message("start must not be after due".into())),
        _ => Ok(()),
    }
}

/// Task entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct Task {
    /// Identifier assigned by the store on creation
    pub id: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    #[validate(nested)]
    pub dates: Dates,
    #[serde(default)]
    pub is_done: bool,
}

/// Request body for creating a task
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateParams {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub description: String,
    /// Must be set explicitly; `none` is rejected
    #[serde(default)]
    #[validate(custom(function = "validate_explicit_priority"))]
    pub priority: Priority,
    #[serde(default)]
    #[validate(nested)]
    pub dates: Dates,
}

fn validate_explicit_priority(priority: &Priority) -> Result<(), ValidationError> {
    if *priority == Priority::None {
        return Err(ValidationError::new("explicit_priority")
            .with_message("must be one of low, medium, high".into()));
    }
    Ok(())
}

/// Request body for replacing a task's mutable fields.
///
/// Absent fields take their zero value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateParams {
    #[serde(default)]
    #[validate(length(min = 1, message = "must not be empty"))]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    #[validate(nested)]
    pub dates: Dates,
    #[serde(default)]
    pub is_done: bool,
}

/// Search request; predicates are optional, pagination is not
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct SearchParams {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub is_done: Option<bool>,
    #[serde(default)]
    pub from: u64,
    #[serde(default = "default_size")]
    #[validate(range(min = 1, max = 1000, message = "must be between 1 and 1000"))]
    pub size: u64,
}

fn default_size() -> u64 {
    10
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            description: None,
            priority: None,
            is_done: None,
            from: 0,
            size: default_size(),
        }
    }
}

impl SearchParams {
    /// Trimmed description, `None` when absent or blank.
    pub fn description_query(&self) -> Option<&str> {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    /// True when no predicate is present.
    pub fn is_zero(&self) -> bool {
        self.description_query().is_none() && self.priority.is_none() && self.is_done.is_none()
    }

    /// Stable rendering of every field, used as the search cache key.
    pub fn cache_key(&self) -> String {
        // Field order is fixed by the struct, nulls included.
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

/// One page of search hits plus the total hit count
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SearchResults {
    pub tasks: Vec<Task>,
    pub total: u64,
}

/// `{"task": ...}` response envelope
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskEnvelope {
    pub task: Task,
}
