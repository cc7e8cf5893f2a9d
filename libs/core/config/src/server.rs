use crate::{ConfigError, Env, FromEnv};
use std::net::Ipv4Addr;

/// Server configuration for HTTP APIs
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromEnv for ServerConfig {
    /// Reads from environment variables with sensible defaults:
    /// - HOST: defaults to Ipv4Addr::UNSPECIFIED (0.0.0.0 - all interfaces)
    /// - PORT: defaults to 8080
    fn from_env(env: &Env) -> Result<Self, ConfigError> {
        let host = env.or_default("HOST", &Ipv4Addr::UNSPECIFIED.to_string());
        let port = env.parse_or("PORT", 8080)?;

        Ok(Self { host, port })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::UNSPECIFIED.to_string(),
            port: 8080,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_from_env_with_defaults() {
        let config = ServerConfig::from_env(&Env::default()).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_server_config_from_env_with_custom_values() {
        let env = Env::from_iter([("HOST", "127.0.0.1"), ("PORT", "3000")]);
        let config = ServerConfig::from_env(&env).unwrap();
        assert_eq!(config.address(), "127.0.0.1:3000");
    }

    #[test]
    fn test_server_config_from_env_port_out_of_range() {
        let env = Env::from_iter([("PORT", "99999")]);
        let err = ServerConfig::from_env(&env).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
