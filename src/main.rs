use anyhow::Result;
use fleetlink::config;
use fleetlink::FleetContext;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetlink=info".into()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "fleetlink.toml".to_string());

    let config = match config::load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %config_path, error = %e, "Config not loaded, using defaults");
            config::FleetConfig::default()
        }
    };

    info!(robots = config.fleet.len(), "Fleetlink starting");

    let context = FleetContext::new(config);
    let runner = context.start();

    tokio::signal::ctrl_c().await?;
    context.shutdown();
    let _ = runner.await;

    info!("Fleetlink stopped");
    Ok(())
}
