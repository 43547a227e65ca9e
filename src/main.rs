use anyhow::Context;
use tracing::info;

use minemetrics::config::AppConfig;
use minemetrics::engine::AggregationEngine;
use minemetrics::sink::influx::InfluxSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let env = std::env::var("MINEMETRICS_ENV").unwrap_or_else(|_| "default".to_string());
    let config = AppConfig::load(&env).context("loading configuration")?;
    info!("Starting, {} customers configured", config.miners.len());

    let idb = &config.general.idb;
    let sink = InfluxSink::new(&idb.host, idb.port, idb.database.clone());
    let engine = AggregationEngine::new(sink);
    engine.run(&config.miners).await;

    info!("Fetch cycle complete");
    Ok(())
}
