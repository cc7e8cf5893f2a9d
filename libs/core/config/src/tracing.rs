use crate::{ConfigError, Env, Environment, FromEnv};
use tracing::{debug, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Logging settings.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    pub environment: Environment,
    /// Collector endpoint from `OTEL_EXPORTER_OTLP_ENDPOINT`.
    ///
    /// No exporter is wired; the value is reported at startup so deployments
    /// can confirm what the collector sidecar expects.
    pub otlp_endpoint: Option<String>,
}

impl FromEnv for TracingConfig {
    fn from_env(env: &Env) -> Result<Self, ConfigError> {
        Ok(Self {
            environment: Environment::from_env(env),
            otlp_endpoint: env
                .get("OTEL_EXPORTER_OTLP_ENDPOINT")
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        })
    }
}

/// Install color-eyre with a project-standard configuration.
///
/// Call this early in main() before any fallible operations. Safe to call
/// multiple times.
pub fn install_color_eyre() {
    let _ = color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install();
}

/// Initialize tracing with environment-aware configuration and error span capture.
///
/// - **Production** (`APP_ENV=production`): JSON lines, flattened events,
///   module targets hidden. Default filter `info`.
/// - **Development** (default): pretty output. Default filter `debug`.
///
/// `RUST_LOG` overrides the default filter in both modes. Calling this more
/// than once is a no-op after the first successful initialization.
pub fn init_tracing(config: &TracingConfig) {
    let is_production = config.environment.is_production();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if is_production {
            EnvFilter::new("info,tower_http=info,sea_orm=warn")
        } else {
            EnvFilter::new("debug,hyper=info,h2=info,async_nats=info")
        }
    });

    let result = if is_production {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .flatten_event(true),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false)
                    .pretty(),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    };

    match result {
        Ok(_) => {
            info!(
                environment = ?config.environment,
                otlp_endpoint = config.otlp_endpoint.as_deref().unwrap_or("none"),
                "Tracing initialized"
            );
        }
        Err(_) => {
            // Already initialized, common in tests
            debug!("Tracing already initialized, skipping re-initialization");
        }
    }
}
