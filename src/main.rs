use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use serve_harness::config::{self, LogFormat};
use serve_harness::observability::{logging, metrics};
use serve_harness::{HttpService, Server};

#[derive(Parser)]
#[command(name = "serve-harness")]
#[command(about = "Serve HTTP on one plain or TLS listener with graceful shutdown", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides config and SERVE_HOST).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides config and SERVE_PORT).
    #[arg(short, long)]
    port: Option<u16>,

    /// Log format: pretty or json.
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = config::load(cli.config.as_deref())?;
    logging::init_logging(cli.log_format.unwrap_or(config.observability.log_format))?;

    tracing::info!("serve-harness v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let service = HttpService::new(Duration::from_secs(cli.request_timeout_secs));
    let mut builder = Server::builder(service).config(config);
    if let Some(host) = cli.host {
        builder = builder.host(host);
    }
    if let Some(port) = cli.port {
        builder = builder.port(port);
    }

    let server = builder.build();
    tracing::info!(
        bind_address = %server.config().bind_address(),
        tls = server.config().tls.enabled,
        "Configuration loaded"
    );

    if let Err(e) = server.start().await {
        tracing::error!(error = %e, "Server failed");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
