use crate::{ConfigError, Env, FromEnv};

/// Redis configuration
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub url: String,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl FromEnv for RedisConfig {
    /// Requires REDIS_URL to be set (no default)
    fn from_env(env: &Env) -> Result<Self, ConfigError> {
        Ok(Self {
            url: env.required("REDIS_URL")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config_from_env_success() {
        let env = Env::from_iter([("REDIS_URL", "redis://localhost:6379")]);
        let config = RedisConfig::from_env(&env).unwrap();
        assert_eq!(config.url, "redis://localhost:6379");
    }

    #[test]
    fn test_redis_config_from_env_missing() {
        let err = RedisConfig::from_env(&Env::default()).unwrap_err();
        assert!(err.to_string().contains("REDIS_URL"));
    }
}
