//! Server infrastructure: router assembly, OpenAPI documents, embedded
//! assets, liveness and graceful shutdown.
//!
//! ```ignore
//! use axum_helpers::server::{create_app, create_router, StaticAsset};
//! use core_config::app_info;
//!
//! let router = create_router::<ApiDoc>(api_routes, ASSETS, app_info!());
//! create_app(router, &server_config).await?;
//! ```

pub mod app;
pub mod assets;
pub mod docs;
pub mod health;
pub mod shutdown;

pub use app::{create_app, create_router};
pub use assets::{StaticAsset, static_router};
pub use docs::docs_router;
pub use health::{HealthResponse, health_router};
pub use shutdown::{cancel_on_shutdown, shutdown_signal};
