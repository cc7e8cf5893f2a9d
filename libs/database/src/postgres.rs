//! PostgreSQL connection pool and migration runner

use core_config::database::DatabaseConfig;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::info;

use crate::common::{DatabaseError, RetryConfig, retry_with_backoff};

pub use sea_orm::{DatabaseConnection, DbErr};

/// Pool options derived from [`DatabaseConfig`].
pub fn connect_options(config: &DatabaseConfig) -> ConnectOptions {
    let mut opt = ConnectOptions::new(config.url());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(false);
    opt
}

/// Open the pool, retrying transient failures.
pub async fn connect(
    config: &DatabaseConfig,
    retry: &RetryConfig,
) -> Result<DatabaseConnection, DatabaseError> {
    let options = connect_options(config);

    let db = retry_with_backoff("postgres", retry, || Database::connect(options.clone())).await?;

    info!(
        host = %config.host,
        port = config.port,
        database = %config.name,
        max_connections = config.max_connections,
        "Connected to PostgreSQL"
    );
    Ok(db)
}

/// Apply all pending migrations of `M`.
pub async fn run_migrations<M: MigratorTrait>(
    db: &DatabaseConnection,
    app_name: &str,
) -> Result<(), DatabaseError> {
    info!(app = app_name, "Running database migrations");
    M::up(db, None)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;
    info!(app = app_name, "Migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_options_follow_config() {
        let config = DatabaseConfig {
            host: "db".to_string(),
            port: 5433,
            username: "todo".to_string(),
            password: "pw".to_string(),
            name: "tasks".to_string(),
            ssl_mode: "require".to_string(),
            max_connections: 7,
            min_connections: 1,
        };

        let options = connect_options(&config);

        assert_eq!(options.get_max_connections(), Some(7));
        assert_eq!(options.get_min_connections(), Some(1));
        assert_eq!(
            options.get_url(),
            "postgres://todo:pw@db:5433/tasks?sslmode=require"
        );
    }
}
