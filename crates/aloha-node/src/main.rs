//! Aloha Node binary
//!
//! Keeps the Aloha ledger and serves it over the admin socket and HTTP.

use aloha_node::{AlohaNode, NodeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aloha_node=info,aloha_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Aloha Node");

    let config = NodeConfig::from_env()?;

    // Create and run node
    let node = AlohaNode::new(config).await?;
    node.run().await?;

    Ok(())
}
