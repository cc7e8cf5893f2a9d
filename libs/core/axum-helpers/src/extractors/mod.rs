//! Extractors shared by the API handlers.

pub mod cancel;
pub mod json;

pub use cancel::RequestCancellation;
pub use json::AppJson;
