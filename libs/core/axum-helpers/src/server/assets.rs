use crate::errors::ErrorResponse;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};

/// A file compiled into the binary with `include_bytes!`/`include_str!`.
#[derive(Clone, Copy, Debug)]
pub struct StaticAsset {
    /// Path below `/static/`, e.g. `index.html`
    pub path: &'static str,
    pub content_type: &'static str,
    pub body: &'static [u8],
}

type Assets = &'static [StaticAsset];

async fn serve_asset(State(assets): State<Assets>, Path(path): Path<String>) -> Response {
    match assets.iter().find(|asset| asset.path == path) {
        Some(asset) => (
            [
                (header::CONTENT_TYPE, asset.content_type),
                (header::CACHE_CONTROL, "public, max-age=3600"),
            ],
            asset.body,
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("asset {path} not found"))),
        )
            .into_response(),
    }
}

async fn index(State(assets): State<Assets>) -> Response {
    serve_asset(State(assets), Path("index.html".to_string())).await
}

/// `GET /static/{*path}` over `assets`; `GET /` serves `index.html` if present.
pub fn static_router(assets: Assets) -> Router {
    if assets.is_empty() {
        tracing::debug!("No static assets registered");
    }
    Router::new()
        .route("/", get(index))
        .route("/static/{*path}", get(serve_asset))
        .with_state(assets)
}
