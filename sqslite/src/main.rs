//! sqslite - lightweight local SQS server
//!
//! Serves an in-memory, SQS-compatible queue engine over the SQS JSON and
//! query protocols, for development and testing.

mod config;
mod router;

use clap::Parser;
use sqslite_sqs::QueueRegistry;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sqslite")]
#[command(about = "Lightweight local SQS-compatible queue server", long_about = None)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "SQSLITE_PORT")]
    port: Option<u16>,

    /// Host to bind to (overrides the config file)
    #[arg(long, env = "SQSLITE_HOST")]
    host: Option<String>,

    /// Configuration file; defaults to sqslite.toml when present
    #[arg(short, long, env = "SQSLITE_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL used in queue URLs handed to clients
    #[arg(long, env = "SQSLITE_ENDPOINT_URL")]
    endpoint_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "SQSLITE_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "sqslite={0},sqslite_sqs={0},tower_http=debug",
                    args.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = config::Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(endpoint_url) = args.endpoint_url {
        config.server.endpoint_url = Some(endpoint_url);
    }

    let registry_config = config.registry_config();
    info!("Starting sqslite...");
    info!("  Endpoint: {}", registry_config.endpoint_url);
    info!("  Account: {}", registry_config.account_id);
    info!("  Region: {}", registry_config.region);
    info!(
        "  Default visibility timeout: {}s",
        registry_config.default_visibility_timeout
    );

    let registry = Arc::new(QueueRegistry::new(registry_config));
    let app = router::create_router(registry);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
