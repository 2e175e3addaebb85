use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use gantry::config::{Config, ConfigManager};
use gantry::server::GatewayServer;

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "An HTTP gateway routing requests by host, path, method and headers")]
struct Args {
    #[arg(short, long, default_value = "config/gateway.toml")]
    config: String,

    /// Override the bind address from the configuration file
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("gantry={}", level))
        .init();

    info!("Starting gantry gateway");

    // Load configuration
    let config = Config::from_file(&args.config).await?;
    let bind_addr = args.bind.unwrap_or(config.server.bind_address);

    let server = Arc::new(GatewayServer::new(bind_addr));
    server.apply(&config).await?;

    // Watch the config file and republish rules on change
    let mut config_manager = ConfigManager::new(&args.config);
    let reload_server = Arc::clone(&server);
    let runtime = tokio::runtime::Handle::current();
    config_manager.set_reload_hook(move |new_config| {
        let server = Arc::clone(&reload_server);
        let new_config = new_config.clone();
        runtime.spawn(async move {
            if let Err(e) = server.apply(&new_config).await {
                warn!("Failed to apply reloaded configuration: {}", e);
            }
        });
    });
    config_manager.start_hot_reload()?;

    // Run until CTRL+C
    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        warn!("Received CTRL+C, shutting down gracefully...");
    };

    server.run(shutdown).await?;

    info!("Gantry shutdown complete");
    Ok(())
}
