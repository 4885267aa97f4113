use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kfwd_engine::{
    Component, Destination, Forwarder, ForwarderConfig, KafkaMessageSource,
    ObjectStoreDestination, ShutdownCoordinator, run_health_server,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "kfwd", version, about = "Forward Kafka messages to an object store")]
struct Args {
    /// Env file loaded before reading KFWD_* configuration.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kfwd=info,kfwd_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(err) = run(args).await {
        error!("{err:#}");
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    match &args.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load env file {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    // Configuration problems are all reported together, before any network
    // connection is attempted.
    let config = ForwarderConfig::from_env()?;
    let destination = Arc::new(ObjectStoreDestination::from_spec(&config.destination)?);
    let source = Arc::new(KafkaMessageSource::connect(&config)?);
    let decoder = config.encoding.decoder();

    info!(
        topic = %config.topic,
        group = %config.consumer_group,
        destination = %destination.display(),
        "starting kfwd"
    );

    let coordinator = ShutdownCoordinator::new(config.shutdown_timeout);
    let cancel = coordinator.cancellation_token();

    let forwarder = Forwarder::new(&config, source, decoder, destination);
    let mut components = vec![Component::spawn("pipeline", forwarder.run(cancel.clone()))];

    if config.run_health_server {
        let host = config.server_host.clone();
        let port = config.server_port;
        let health_cancel = cancel.clone();
        components.push(Component::spawn("health-server", async move {
            run_health_server(&host, port, health_cancel).await
        }));
    }

    coordinator.run(components).await?;
    Ok(())
}
