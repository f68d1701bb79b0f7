//! corectld-dns binary entry point.

use clap::Parser;
use corectld_dns::{store, telemetry, Config, DnsServer, HostIdentity, RouteIdentity, StaticIdentity};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Guest-facing DNS responder backed by etcd.
#[derive(Parser, Debug)]
#[command(name = "corectld-dns")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML).
    #[arg(short, long, default_value = "corectld-dns.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        config_file = %args.config.display(),
        listen_addr = %config.dns.listen_addr,
        domain_root = %config.dns.domain_root,
        store = ?config.store.kind,
        "Starting corectld-dns"
    );

    let store = store::from_config(&config.store)?;
    let identity: Arc<dyn HostIdentity> = match config.dns.host_address {
        Some(ip) => Arc::new(StaticIdentity(ip)),
        None => Arc::new(RouteIdentity::default()),
    };

    let server = DnsServer::new(config.dns, store, identity);
    if let Err(e) = server.start_configured().await {
        error!("DNS server failed to start: {}", e);
        return Err(e.into());
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    server.stop().await;
    info!("corectld-dns shutdown complete");
    Ok(())
}
