use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use token_broker::broker::Broker;
use token_broker::config::proc_loader::collect_providers;
use token_broker::server;
use token_broker::utils::config_loader;
use token_broker::utils::logging;
use token_broker::utils::logging::LogLevel;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "token-broker.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // -------------------------------
    // 1. Load YAML config
    // -------------------------------

    let service_config = config_loader::run(&args.config).await?;
    logging::run(&service_config, args.log_level).await?;

    // -------------------------------
    // 2. Load token providers
    // -------------------------------

    let providers = collect_providers(&service_config).await?;
    let broker = Broker::from_configs(&providers).context("building token providers")?;
    broker.log_registered().await;

    // -------------------------------
    // 3. Serve tokens
    // -------------------------------

    info!("Service starting...");
    server::server::start(&service_config.settings, Arc::new(broker)).await
}
