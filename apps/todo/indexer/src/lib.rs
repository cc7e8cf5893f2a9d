//! Search indexer process.
//!
//! Follows task change events on the configured bus and applies them to the
//! Elasticsearch index until shutdown.

use core_config::{
    AppInfo, Env, FromEnv, app_info,
    bus::{BusConfig, IndexerConfig},
    search::SearchConfig,
    tracing::TracingConfig,
};
use domain_tasks::bus::CONSUMER;
use domain_tasks::{ChangeFeed, ElasticsearchTaskSearch, TaskIndexer};
use eyre::WrapErr;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub tracing: TracingConfig,
    pub search: SearchConfig,
    pub bus: BusConfig,
    pub indexer: IndexerConfig,
    /// Consumer-group member name; one per host so replicas share the group
    pub consumer: String,
}

impl Config {
    pub fn from_env(env: &Env) -> eyre::Result<Self> {
        Ok(Self {
            app: app_info!(),
            tracing: TracingConfig::from_env(env)?,
            search: SearchConfig::from_env(env)?,
            bus: BusConfig::from_env(env)?,
            indexer: IndexerConfig::from_env(env)?,
            consumer: format!("{CONSUMER}-{}", env.or_default("HOSTNAME", "local")),
        })
    }
}

/// Run the indexer until `shutdown` fires and the in-flight message drains.
pub async fn run(config: Config, shutdown: CancellationToken) -> eyre::Result<()> {
    info!(
        app = config.app.name,
        version = config.app.version,
        bus = ?config.bus.kind,
        consumer = %config.consumer,
        "Starting indexer"
    );

    let search = ElasticsearchTaskSearch::new(&config.search.url, config.search.timeout)
        .wrap_err("Invalid search backend settings")?;
    search
        .ensure_index(&shutdown)
        .await
        .wrap_err("Failed to prepare search index")?;

    let mut feed = ChangeFeed::connect(&config.bus, &config.consumer)
        .await
        .wrap_err_with(|| format!("Failed to subscribe to {:?} bus", config.bus.kind))?;

    TaskIndexer::new(search)
        .with_drain_timeout(config.indexer.drain_timeout)
        .run(&mut feed, shutdown)
        .await
        .wrap_err("Indexer stopped with an error")?;

    info!("Indexer shutdown complete");
    Ok(())
}
