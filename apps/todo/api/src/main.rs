use axum_helpers::{StaticAsset, create_app, create_router};
use core_config::secrets::load_env;
use core_config::tracing::{init_tracing, install_color_eyre};
use database::RetryConfig;
use domain_tasks::{
    CachedTaskSearch, CachedTaskStore, ChangeBus, CircuitBreaker, ElasticsearchTaskSearch,
    PgTaskStore, RedisCache, TaskService, TasksApiDoc, handlers,
};
use eyre::WrapErr;
use migration::Migrator;
use tracing::info;

mod config;

use config::Config;

static ASSETS: &[StaticAsset] = &[
    StaticAsset {
        path: "index.html",
        content_type: "text/html; charset=utf-8",
        body: include_bytes!("../static/index.html"),
    },
    StaticAsset {
        path: "app.css",
        content_type: "text/css; charset=utf-8",
        body: include_bytes!("../static/app.css"),
    },
];

#[tokio::main]
async fn main() -> eyre::Result<()> {
    install_color_eyre();

    // Secrets referenced by `*_SECURE` are resolved before any settings are read
    let env = load_env().await.wrap_err("Failed to load environment")?;
    let config = Config::from_env(&env)?;

    init_tracing(&config.tracing);
    info!(
        app = config.app.name,
        version = config.app.version,
        environment = ?config.environment,
        otlp_endpoint = ?config.tracing.otlp_endpoint,
        "Starting"
    );

    let retry = RetryConfig::default();
    let (db, redis) = tokio::try_join!(
        async {
            database::postgres::connect(&config.database, &retry)
                .await
                .wrap_err("PostgreSQL connection failed")
        },
        async {
            database::redis::connect(&config.redis.url, &retry)
                .await
                .wrap_err("Redis connection failed")
        },
    )?;

    database::postgres::run_migrations::<Migrator>(&db, config.app.name)
        .await
        .wrap_err("Failed to run migrations")?;

    let cache = RedisCache::new(redis);
    let store = CachedTaskStore::new(PgTaskStore::new(db), cache.clone());
    let backend = ElasticsearchTaskSearch::new(&config.search.url, config.search.timeout)
        .wrap_err("Invalid search backend settings")?;
    let search = CachedTaskSearch::new(backend, cache).with_ttl(config.search.cache_ttl);
    let publisher = ChangeBus::connect(&config.bus)
        .await
        .wrap_err_with(|| format!("Failed to connect to {:?} bus", config.bus.kind))?;
    let breaker = CircuitBreaker::new("search", (&config.search).into());

    let service = TaskService::new(store, search, publisher, breaker);
    let router = create_router::<TasksApiDoc>(handlers::router(service), ASSETS, config.app);

    create_app(router, &config.server)
        .await
        .wrap_err("Server error")?;

    info!("Shutdown complete");
    Ok(())
}
