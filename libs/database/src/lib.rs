//! Connection helpers for the task backends: PostgreSQL (SeaORM) and Redis.
//!
//! ```ignore
//! use core_config::{FromEnv, database::DatabaseConfig};
//! use database::{RetryConfig, postgres};
//!
//! let db = postgres::connect(&DatabaseConfig::from_env(&env)?, &RetryConfig::default()).await?;
//! postgres::run_migrations::<migration::Migrator>(&db, "todo_api").await?;
//! ```

pub mod common;
pub mod postgres;
pub mod redis;

pub use common::{DatabaseError, DatabaseResult, RetryConfig};
