//! # Axum Helpers
//!
//! Shared HTTP plumbing for the task services.
//!
//! - **[`errors`]**: `AppError` and the `{error, validations?}` response envelope
//! - **[`extractors`]**: JSON body extractor with enveloped rejections, per-request cancellation
//! - **[`server`]**: router assembly, OpenAPI documents, static assets, health, graceful shutdown

pub mod errors;
pub mod extractors;
pub mod server;

pub use errors::{AppError, ErrorResponse, flatten_validations};
pub use extractors::{AppJson, RequestCancellation};
pub use server::{
    StaticAsset, cancel_on_shutdown, create_app, create_router, health_router, shutdown_signal,
};
