use super::assets::{StaticAsset, static_router};
use super::docs::docs_router;
use super::health::health_router;
use super::shutdown::shutdown_signal;
use crate::errors::handlers::not_found;
use axum::Router;
use core_config::AppInfo;
use core_config::server::ServerConfig;
use std::io;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};
use utoipa::OpenApi;

/// Combine domain routes with documents, assets, liveness and common layers.
///
/// `apis` must already carry its state. Unknown paths answer 404 in the JSON
/// error envelope.
pub fn create_router<T>(apis: Router, assets: &'static [StaticAsset], app_info: AppInfo) -> Router
where
    T: OpenApi + 'static,
{
    Router::new()
        .merge(apis)
        .merge(docs_router::<T>())
        .merge(static_router(assets))
        .merge(health_router(app_info))
        .fallback(not_found)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
}

/// Serve `router` until SIGINT/SIGTERM, letting in-flight requests finish.
pub async fn create_app(router: Router, server_config: &ServerConfig) -> io::Result<()> {
    let listener = tokio::net::TcpListener::bind(server_config.address()).await?;

    info!(address = %listener.local_addr()?, "Server starting");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .inspect_err(|e| {
            tracing::error!(error = ?e, "Server encountered an error");
        })?;

    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum::routing::get;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[derive(OpenApi)]
    #[openapi(info(title = "test api"))]
    struct TestDoc;

    static ASSETS: &[StaticAsset] = &[
        StaticAsset {
            path: "index.html",
            content_type: "text/html; charset=utf-8",
            body: b"<h1>tasks</h1>",
        },
        StaticAsset {
            path: "css/app.css",
            content_type: "text/css",
            body: b"body{}",
        },
    ];

    fn app() -> Router {
        let apis = Router::new().route("/ping", get(|| async { "pong" }));
        create_router::<TestDoc>(
            apis,
            ASSETS,
            AppInfo {
                name: "test",
                version: "0.0.1",
            },
        )
    }

    async fn get_path(path: &str) -> axum::response::Response {
        app()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_domain_routes_are_mounted() {
        let response = get_path("/ping").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_openapi_documents() {
        let json = get_path("/openapi3.json").await;
        assert_eq!(json.status(), StatusCode::OK);
        let bytes = json.into_body().collect().await.unwrap().to_bytes();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["info"]["title"], "test api");

        let yaml = get_path("/openapi3.yaml").await;
        assert_eq!(yaml.status(), StatusCode::OK);
        assert_eq!(
            yaml.headers()[header::CONTENT_TYPE],
            "application/yaml"
        );
    }

    #[tokio::test]
    async fn test_static_assets() {
        let css = get_path("/static/css/app.css").await;
        assert_eq!(css.status(), StatusCode::OK);
        assert_eq!(css.headers()[header::CONTENT_TYPE], "text/css");

        let index = get_path("/").await;
        assert_eq!(index.status(), StatusCode::OK);

        let missing = get_path("/static/missing.js").await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_and_fallback() {
        let health = get_path("/health").await;
        assert_eq!(health.status(), StatusCode::OK);
        let bytes = health.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["name"], "test");

        let unknown = get_path("/nope").await;
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }
}
