// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! pcpcs daemon
//!
//! Standalone process exposing pcpcs-core's discovery and transfer services without a
//! GUI: runs UDP broadcast discovery and the TCP transfer server, and logs every text
//! message, file and folder it receives through `tracing`.
//!
//! # Usage
//!
//! ```bash
//! # Start on the default bind address, logging at info level
//! pcpcs-daemon
//!
//! # Custom bind address and config file
//! pcpcs-daemon --bind 192.168.1.50 --config pcpcs-daemon.json
//!
//! # Receive into a specific directory instead of ~/pcpcs_received
//! pcpcs-daemon --receive-dir /srv/incoming
//! ```

use clap::Parser;
use std::net::{IpAddr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod events;

pub use config::DaemonConfig;

use events::TracingEvents;
use pcpcs_core::discovery::DiscoveryService;
use pcpcs_core::identity::HostIdentity;
use pcpcs_core::server::PcpcsServer;

/// pcpcs daemon - headless peer discovery and file/folder receiver for a trusted LAN.
#[derive(Parser, Debug)]
#[command(name = "pcpcs-daemon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind address for discovery and the transfer server (0.0.0.0 for all interfaces).
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Configuration file (JSON format). Overrides the other flags when given.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to write received files and folders into.
    #[arg(long)]
    receive_dir: Option<PathBuf>,

    /// Disable UDP broadcast discovery; only the transfer server runs.
    #[arg(long, default_value = "false")]
    no_discovery: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = if let Some(config_path) = &args.config {
        DaemonConfig::from_file(config_path)?
    } else {
        DaemonConfig {
            bind_address: args.bind.parse()?,
            receive_dir: args.receive_dir.clone(),
            discovery_enabled: !args.no_discovery,
            log_level: args.log_level.clone(),
        }
    };
    config.validate()?;

    let level = match config.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).with_target(true).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let receive_dir = match &config.receive_dir {
        Some(dir) => dir.clone(),
        None => pcpcs_core::receive_area::receive_dir()?,
    };

    let identity = HostIdentity::resolve();

    info!("+----------------------------------------------------+");
    info!("|  pcpcs-daemon v{:<37}|", env!("CARGO_PKG_VERSION"));
    info!("+----------------------------------------------------+");
    info!("|  Host:      {:<40}|", identity.hostname);
    info!("|  Bind:      {:<40}|", config.bind_address);
    info!("|  Receive:   {:<40}|", receive_dir.display());
    info!(
        "|  Discovery: {:<40}|",
        if config.discovery_enabled { "enabled" } else { "disabled" }
    );
    info!("+----------------------------------------------------+");

    let discovery = if config.discovery_enabled {
        match DiscoveryService::start(identity.clone()) {
            Ok(service) => Some(service),
            Err(e) => {
                error!("failed to start discovery: {e}");
                None
            }
        }
    } else {
        None
    };

    let addr = SocketAddrV4::new(bind_ipv4(config.bind_address), pcpcs_core::config::TRANSFER_PORT);
    let events = Arc::new(TracingEvents);
    let server = Arc::new(PcpcsServer::bind_addr(addr, receive_dir, events)?);
    info!("transfer server listening on {}", server.local_addr()?);

    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received, stopping");
        shutdown_server.stop();
    });

    let run_server = server.clone();
    let accept_loop = tokio::task::spawn_blocking(move || run_server.run());
    accept_loop.await?;

    if let Some(discovery) = discovery {
        discovery.stop();
    }

    info!("pcpcs daemon stopped");
    Ok(())
}

fn bind_ipv4(addr: IpAddr) -> std::net::Ipv4Addr {
    match addr {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(_) => std::net::Ipv4Addr::UNSPECIFIED,
    }
}
