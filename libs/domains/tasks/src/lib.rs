//! Tasks Domain
//!
//! Task records live in Postgres. A search index is kept in step by an
//! asynchronous indexer that follows change events on a message bus.
//!
//! # Architecture
//!
//! ```text
//!   HTTP handlers
//!        │
//! ┌──────▼──────┐   publish   ┌─────────┐   consume   ┌─────────┐
//! │ TaskService │ ──────────> │   Bus   │ ──────────> │ Indexer │
//! └──┬───────┬──┘             └─────────┘             └────┬────┘
//!    │       │ search (breaker)                            │
//! ┌──▼───┐ ┌─▼──────┐ <───────────────────────────────────┘
//! │Store │ │ Search │        index / delete
//! └──────┘ └────────┘
//! ```
//!
//! Store and search are both reachable through an optional cache layer
//! ([`CachedTaskStore`], [`CachedTaskSearch`]) that implements the same trait.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use domain_tasks::{
//!     CachedTaskStore, ChangeBus, CircuitBreaker, ElasticsearchTaskSearch, PgTaskStore,
//!     RedisCache, TaskService,
//! };
//! # async fn example(
//! #     db: sea_orm::DatabaseConnection,
//! #     redis: redis::aio::ConnectionManager,
//! #     bus: &core_config::bus::BusConfig,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let store = CachedTaskStore::new(PgTaskStore::new(db), RedisCache::new(redis));
//! let search = ElasticsearchTaskSearch::new("http://localhost:9200", Duration::from_secs(5))?;
//! let publisher = ChangeBus::connect(bus).await?;
//!
//! let service = TaskService::new(store, search, publisher, CircuitBreaker::new("search", Default::default()));
//! let router = domain_tasks::handlers::router(service);
//! # Ok(())
//! # }
//! ```

pub mod breaker;
pub mod bus;
pub mod cache;
pub mod cancel;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod indexer;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod search;
pub mod service;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use bus::{ChangeBus, ChangeEvent, ChangeFeed, ChangePublisher, ChangeSubscriber, Delivery};
pub use cache::{CachedTaskSearch, CachedTaskStore, KeyValueCache, RedisCache};
pub use error::{ErrorCode, TaskError, TaskResult};
pub use handlers::TasksApiDoc;
pub use indexer::TaskIndexer;
pub use models::{
    CreateParams, Dates, Priority, SearchParams, SearchResults, Task, TaskEnvelope, UpdateParams,
};
pub use postgres::PgTaskStore;
pub use repository::TaskStore;
pub use search::{ElasticsearchTaskSearch, TaskSearch};
pub use service::TaskService;
