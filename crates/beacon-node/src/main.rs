//! Beacon Node binary
//!
//! A Beacon mesh sensor node or provisioner, configured from `BEACON_*`
//! environment variables.

use beacon_node::{BeaconNode, NodeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beacon_node=info,beacon=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Beacon Node");

    let config = NodeConfig::from_env()?;
    BeaconNode::new(config).run().await?;

    Ok(())
}
