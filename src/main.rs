use std::sync::Arc;
use std::time::Duration;

use robocripto::engine::Engine;
use robocripto::exchange::ExchangeClient;
use robocripto::BotConfig;
use tracing_subscriber::EnvFilter;

/// Time allowed for the loops to wind down after Ctrl-C.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("robocripto=info")),
        )
        .init();

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        "🤖 robocripto starting: quote={} strategy={:?} refresh={:?}",
        config.quote_asset,
        config.strategy,
        config.refresh_interval
    );

    let client = Arc::new(ExchangeClient::new(&config.api_url, &config.api_key)?);
    let engine = Arc::new(Engine::new(config, client)?);

    engine.start();
    let loops = tokio::spawn(engine.clone().run());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping");
    engine.stop();
    engine.shutdown();

    if tokio::time::timeout(SHUTDOWN_DEADLINE, loops).await.is_err() {
        tracing::warn!("Loops did not stop within {:?}, exiting anyway", SHUTDOWN_DEADLINE);
    }

    Ok(())
}
