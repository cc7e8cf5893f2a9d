use crate::errors::AppError;
use axum::{
    Json, Router,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use utoipa::OpenApi;

async fn openapi_json<T: OpenApi>() -> Response {
    Json(T::openapi()).into_response()
}

async fn openapi_yaml<T: OpenApi>() -> Response {
    match T::openapi().to_yaml() {
        Ok(yaml) => ([(header::CONTENT_TYPE, "application/yaml")], yaml).into_response(),
        Err(e) => AppError::Internal(format!("render OpenAPI YAML: {e}")).into_response(),
    }
}

/// `GET /openapi3.json` and `GET /openapi3.yaml` for document `T`.
pub fn docs_router<T: OpenApi + 'static>() -> Router {
    Router::new()
        .route("/openapi3.json", get(openapi_json::<T>))
        .route("/openapi3.yaml", get(openapi_yaml::<T>))
}
