//! Container-backed fixtures for task integration tests
//!
//! - `TestDatabase`: PostgreSQL with the workspace migrations applied (feature: "postgres")
//! - `TestRedis`: Redis with a reconnecting connection manager (feature: "redis")
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { workspace = true, features = ["redis"] }
//! ```
//!
//! ```rust,ignore
//! use test_utils::TestDatabase;
//!
//! #[tokio::test]
//! async fn stores_tasks() {
//!     let db = TestDatabase::new().await;
//!     let store = PgTaskStore::new(db.connection());
//! }
//! ```

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "postgres")]
pub use postgres::TestDatabase;

#[cfg(feature = "redis")]
pub use redis::TestRedis;
