use axum_helpers::cancel_on_shutdown;
use core_config::secrets::load_env;
use core_config::tracing::{init_tracing, install_color_eyre};
use eyre::WrapErr;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    install_color_eyre();

    let env = load_env().await.wrap_err("Failed to load environment")?;
    let config = todo_indexer::Config::from_env(&env)?;
    init_tracing(&config.tracing);

    todo_indexer::run(config, cancel_on_shutdown()).await
}
