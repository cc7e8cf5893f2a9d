use core_config::{
    AppInfo, Env, Environment, FromEnv, app_info, bus::BusConfig, database::DatabaseConfig,
    redis::RedisConfig, search::SearchConfig, server::ServerConfig, tracing::TracingConfig,
};

/// Settings of the API process, composed from the shared config components.
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub environment: Environment,
    pub tracing: TracingConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub search: SearchConfig,
    pub bus: BusConfig,
}

impl Config {
    pub fn from_env(env: &Env) -> eyre::Result<Self> {
        Ok(Self {
            app: app_info!(),
            environment: Environment::from_env(env),
            tracing: TracingConfig::from_env(env)?,
            server: ServerConfig::from_env(env)?,
            database: DatabaseConfig::from_env(env)?,
            redis: RedisConfig::from_env(env)?,
            search: SearchConfig::from_env(env)?,
            bus: BusConfig::from_env(env)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_config::bus::BusKind;
    use std::time::Duration;

    fn vars() -> Vec<(&'static str, Option<&'static str>)> {
        vec![
            ("APP_ENV", None),
            ("PORT", None),
            ("BUS_KIND", None),
            ("SEARCH_CACHE_TTL_SECS", None),
            ("DATABASE_HOST", Some("localhost")),
            ("DATABASE_USERNAME", Some("todo")),
            ("DATABASE_PASSWORD", Some("secret")),
            ("DATABASE_NAME", Some("tasks")),
            ("ELASTICSEARCH_URL", Some("http://localhost:9200")),
            ("REDIS_URL", Some("redis://localhost:6379")),
            ("NATS_URL", Some("nats://localhost:4222")),
        ]
    }

    #[test]
    fn test_defaults() {
        temp_env::with_vars(vars(), || {
            let config = Config::from_env(&Env::from_process()).unwrap();
            assert_eq!(config.app.name, "todo_api");
            assert_eq!(config.server.port, 8080);
            assert_eq!(config.bus.kind, BusKind::Nats);
            assert_eq!(config.search.cache_ttl, Duration::from_secs(25));
            assert!(!config.environment.is_production());
        });
    }

    #[test]
    fn test_missing_search_endpoint() {
        let mut vars = vars();
        vars.retain(|(key, _)| *key != "ELASTICSEARCH_URL");
        vars.push(("ELASTICSEARCH_URL", None));

        temp_env::with_vars(vars, || {
            let err = Config::from_env(&Env::from_process()).unwrap_err();
            assert!(err.to_string().contains("ELASTICSEARCH_URL"));
        });
    }
}
