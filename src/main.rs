use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kestrel::cli;
use kestrel::client::DiscoveryClient;
use kestrel::registry::{HttpRegistryClient, InstanceInfo, InstanceStatus};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kestrel=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse args and env vars
    let args = cli::Cli::parse();
    let settings = args.into_settings();

    let instance = Arc::new(InstanceInfo::new(
        settings.instance_id(),
        settings.app_name.clone(),
        settings.hostname.clone(),
        settings.port,
    ));
    instance.set_status(InstanceStatus::Up);

    let registry = Arc::new(HttpRegistryClient::new(&settings, Arc::clone(&instance))?);
    let client = DiscoveryClient::new(settings, instance, registry);

    info!("Starting Kestrel discovery client");
    client.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    client.shutdown().await;

    Ok(())
}
