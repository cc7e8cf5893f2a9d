use crate::{ConfigError, Env, FromEnv};
use std::time::Duration;

/// Search backend endpoint and read-path tuning.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    /// Elasticsearch base URL, e.g. `http://localhost:9200`
    pub url: String,
    /// Upper bound on a single backend request
    pub timeout: Duration,
    /// TTL of cached search result pages
    pub cache_ttl: Duration,
    /// Consecutive failures that open the circuit breaker
    pub breaker_failure_threshold: u32,
    /// How long the breaker stays open before allowing a probe
    pub breaker_open_timeout: Duration,
}

impl FromEnv for SearchConfig {
    fn from_env(env: &Env) -> Result<Self, ConfigError> {
        Ok(Self {
            url: env.required("ELASTICSEARCH_URL")?,
            timeout: Duration::from_secs(env.parse_or("SEARCH_TIMEOUT_SECS", 5)?),
            cache_ttl: Duration::from_secs(env.parse_or("SEARCH_CACHE_TTL_SECS", 25)?),
            breaker_failure_threshold: env.parse_or("BREAKER_FAILURE_THRESHOLD", 3)?,
            breaker_open_timeout: Duration::from_secs(
                env.parse_or("BREAKER_OPEN_TIMEOUT_SECS", 120)?,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_config_defaults() {
        let env = Env::from_iter([("ELASTICSEARCH_URL", "http://localhost:9200")]);
        let config = SearchConfig::from_env(&env).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.cache_ttl, Duration::from_secs(25));
        assert_eq!(config.breaker_failure_threshold, 3);
        assert_eq!(config.breaker_open_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_search_config_requires_url() {
        let err = SearchConfig::from_env(&Env::default()).unwrap_err();
        assert!(err.to_string().contains("ELASTICSEARCH_URL"));
    }
}
