use anyhow::Context;
use subscriptions_app::{AppConfig, Collaborators, Runtime};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    subscriptions_observability::init();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    let Runtime {
        services: _services,
        orchestrator,
    } = Runtime::start(config, Collaborators::in_memory());

    tracing::info!("ready; waiting for a termination signal");

    orchestrator
        .run_until_signal()
        .await
        .context("failed to install signal handlers")?;

    tracing::info!("shutdown complete");
    Ok(())
}
