//! Demo entry point: streams a synthetic dataset and plays it back

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod demo;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = demo::DemoConfig::parse();
    info!("Starting cortex demo with {:?}", config);

    demo::run(config).await
}
