//! Indirect configuration through a secret provider.
//!
//! Any variable `X` can be supplied indirectly by setting `X_SECURE` to
//! `<path-secret>:<key>`. The value is read from the provider at
//! `<VAULT_PATH>/data/<path-secret>` and replaces `X` in the [`Env`] snapshot.
//!
//! ```ignore
//! DATABASE_PASSWORD_SECURE=todo/postgres:password
//! ```

use crate::{ConfigError, Env, FromEnv};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::kv2;

const SECURE_SUFFIX: &str = "_SECURE";

/// Key/value pairs stored under one secret path.
pub type SecretData = HashMap<String, String>;

/// Source of secret values, addressed by path.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn read(&self, path: &str) -> Result<Arc<SecretData>, ConfigError>;
}

/// Vault connection settings.
#[derive(Clone, Debug)]
pub struct VaultConfig {
    pub address: String,
    pub token: String,
    /// KV v2 mount, e.g. `secret`
    pub path: String,
}

impl FromEnv for VaultConfig {
    fn from_env(env: &Env) -> Result<Self, ConfigError> {
        Ok(Self {
            address: env.required("VAULT_ADDR")?,
            token: env.required("VAULT_TOKEN")?,
            path: env.required("VAULT_PATH")?,
        })
    }
}

/// HashiCorp Vault KV v2 provider.
pub struct VaultSecretProvider {
    client: VaultClient,
    mount: String,
}

impl VaultSecretProvider {
    pub fn new(config: &VaultConfig) -> Result<Self, ConfigError> {
        let settings = VaultClientSettingsBuilder::default()
            .address(&config.address)
            .token(&config.token)
            .build()
            .map_err(|e| ConfigError::Secret {
                key: "VAULT_ADDR".to_string(),
                details: format!("invalid vault settings: {e}"),
            })?;

        let client = VaultClient::new(settings).map_err(|e| ConfigError::Secret {
            key: "VAULT_ADDR".to_string(),
            details: e.to_string(),
        })?;

        Ok(Self {
            client,
            mount: config.path.clone(),
        })
    }
}

#[async_trait]
impl SecretProvider for VaultSecretProvider {
    async fn read(&self, path: &str) -> Result<Arc<SecretData>, ConfigError> {
        debug!(mount = %self.mount, path = %path, "Reading secret from Vault");

        let data: SecretData = kv2::read(&self.client, &self.mount, path)
            .await
            .map_err(|e| ConfigError::Secret {
                key: path.to_string(),
                details: e.to_string(),
            })?;

        Ok(Arc::new(data))
    }
}

/// Memoises provider reads per path; each path is fetched at most once.
pub struct CachedSecretProvider<P> {
    inner: P,
    cache: RwLock<HashMap<String, Arc<SecretData>>>,
}

impl<P: SecretProvider> CachedSecretProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<P: SecretProvider> SecretProvider for CachedSecretProvider<P> {
    async fn read(&self, path: &str) -> Result<Arc<SecretData>, ConfigError> {
        if let Some(hit) = self.cache.read().await.get(path) {
            return Ok(Arc::clone(hit));
        }

        let mut cache = self.cache.write().await;
        if let Some(hit) = cache.get(path) {
            return Ok(Arc::clone(hit));
        }

        let data = self.inner.read(path).await?;
        cache.insert(path.to_string(), Arc::clone(&data));
        Ok(data)
    }
}

/// Replace every `X` for which `X_SECURE` is present with the referenced secret.
pub async fn resolve_secure_overrides(
    mut env: Env,
    provider: Option<&dyn SecretProvider>,
) -> Result<Env, ConfigError> {
    let mut secure: Vec<(String, String)> = env
        .iter()
        .filter_map(|(key, value)| {
            let target = key.strip_suffix(SECURE_SUFFIX)?;
            (!target.is_empty()).then(|| (key.clone(), value.clone()))
        })
        .collect();
    secure.sort();

    if secure.is_empty() {
        return Ok(env);
    }

    let Some(provider) = provider else {
        return Err(ConfigError::Secret {
            key: secure[0].0.clone(),
            details: "no secret provider configured (set VAULT_ADDR, VAULT_TOKEN, VAULT_PATH)"
                .to_string(),
        });
    };

    for (secure_key, reference) in secure {
        let target = secure_key.trim_end_matches(SECURE_SUFFIX).to_string();
        let (path, field) = reference
            .rsplit_once(':')
            .filter(|(path, field)| !path.is_empty() && !field.is_empty())
            .ok_or_else(|| ConfigError::ParseError {
                key: secure_key.clone(),
                details: format!("expected '<path>:<key>', got '{reference}'"),
            })?;

        let data = provider.read(path).await?;
        let value = data.get(field).ok_or_else(|| ConfigError::Secret {
            key: secure_key.clone(),
            details: format!("key '{field}' not found under '{path}'"),
        })?;

        debug!(variable = %target, path = %path, "Applied secret override");
        env.set(target, value.clone());
    }

    Ok(env)
}

/// Snapshot the process environment and apply `*_SECURE` overrides.
///
/// A Vault provider is only constructed when at least one override exists.
pub async fn load_env() -> Result<Env, ConfigError> {
    let env = Env::from_process();
    let needs_provider = env
        .iter()
        .any(|(key, _)| key.len() > SECURE_SUFFIX.len() && key.ends_with(SECURE_SUFFIX));

    if !needs_provider {
        return Ok(env);
    }

    let vault = VaultConfig::from_env(&env)?;
    info!(address = %vault.address, mount = %vault.path, "Resolving secure overrides from Vault");
    let provider = CachedSecretProvider::new(VaultSecretProvider::new(&vault)?);
    resolve_secure_overrides(env, Some(&provider)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticProvider {
        reads: AtomicUsize,
        data: HashMap<String, SecretData>,
    }

    impl StaticProvider {
        fn new() -> Self {
            let mut data = HashMap::new();
            data.insert(
                "todo/postgres".to_string(),
                SecretData::from([
                    ("password".to_string(), "s3cr3t".to_string()),
                    ("username".to_string(), "todo_user".to_string()),
                ]),
            );
            Self {
                reads: AtomicUsize::new(0),
                data,
            }
        }
    }

    #[async_trait]
    impl SecretProvider for StaticProvider {
        async fn read(&self, path: &str) -> Result<Arc<SecretData>, ConfigError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.data
                .get(path)
                .cloned()
                .map(Arc::new)
                .ok_or_else(|| ConfigError::Secret {
                    key: path.to_string(),
                    details: "not found".to_string(),
                })
        }
    }

    #[tokio::test]
    async fn test_secure_variable_overrides_plain_value() {
        let env = Env::from_iter([
            ("DATABASE_PASSWORD", "plain"),
            ("DATABASE_PASSWORD_SECURE", "todo/postgres:password"),
        ]);
        let provider = StaticProvider::new();

        let env = resolve_secure_overrides(env, Some(&provider)).await.unwrap();

        assert_eq!(env.get("DATABASE_PASSWORD"), Some("s3cr3t"));
    }

    #[tokio::test]
    async fn test_cached_provider_reads_each_path_once() {
        let env = Env::from_iter([
            ("DATABASE_PASSWORD_SECURE", "todo/postgres:password"),
            ("DATABASE_USERNAME_SECURE", "todo/postgres:username"),
        ]);
        let provider = CachedSecretProvider::new(StaticProvider::new());

        let env = resolve_secure_overrides(env, Some(&provider)).await.unwrap();

        assert_eq!(env.get("DATABASE_USERNAME"), Some("todo_user"));
        assert_eq!(env.get("DATABASE_PASSWORD"), Some("s3cr3t"));
        assert_eq!(provider.inner.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_secret_key_fails() {
        let env = Env::from_iter([("DATABASE_PASSWORD_SECURE", "todo/postgres:missing")]);
        let provider = StaticProvider::new();

        let err = resolve_secure_overrides(env, Some(&provider)).await.unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn test_malformed_reference_fails() {
        let env = Env::from_iter([("DATABASE_PASSWORD_SECURE", "no-separator")]);
        let provider = StaticProvider::new();

        let err = resolve_secure_overrides(env, Some(&provider)).await.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[tokio::test]
    async fn test_secure_variable_without_provider_fails() {
        let env = Env::from_iter([("REDIS_URL_SECURE", "todo/redis:url")]);
        let err = resolve_secure_overrides(env, None).await.unwrap_err();
        assert!(err.to_string().contains("REDIS_URL_SECURE"));
    }

    #[tokio::test]
    async fn test_no_secure_variables_is_passthrough() {
        let env = Env::from_iter([("REDIS_URL", "redis://localhost")]);
        let env = resolve_secure_overrides(env, None).await.unwrap();
        assert_eq!(env.get("REDIS_URL"), Some("redis://localhost"));
    }
}
