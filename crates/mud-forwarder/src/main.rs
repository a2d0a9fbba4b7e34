// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MUD Forwarder CLI
//!
//! Listens for MUD notifications and advertises the forwarder service.
//!
//! # Usage
//!
//! ```bash
//! # Default: [::]:1234, static topology in role "disabled"
//! mud-forwarder
//!
//! # Act as a router advertising the first mesh-local address given
//! mud-forwarder --role router --mesh-address fdde:ad00:beef::1
//!
//! # Using configuration file
//! mud-forwarder --config forwarder.toml
//!
//! # Send a notification to a running forwarder
//! mud-forwarder send --to [::1]:1234 --url https://example.com/mud.json --address fd00::2
//! ```

use clap::{Parser, Subcommand};
use mud_forwarder::{
    notification, ChangedFlags, DeviceRole, Forwarder, ForwarderConfig, ForwarderStatsSnapshot,
    LocalServiceRegistry, LogSink, StaticTopology, TopologyProvider, UdpEndpoint, UnicastAddress,
};
use std::net::{IpAddr, Ipv6Addr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// MUD notification forwarder
#[derive(Parser, Debug)]
#[command(name = "mud-forwarder")]
#[command(about = "MUD Forwarder - receives MUD URL notifications from mesh devices")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UDP port to listen on
    #[arg(short, long, conflicts_with = "config")]
    port: Option<u16>,

    /// Bind address
    #[arg(short, long, conflicts_with = "config")]
    bind: Option<IpAddr>,

    /// Own address to advertise (overrides mesh address selection)
    #[arg(long)]
    own_address: Option<Ipv6Addr>,

    /// Mesh-local address assigned to this node (can repeat)
    #[arg(long = "mesh-address", value_delimiter = ',')]
    mesh_addresses: Vec<Ipv6Addr>,

    /// Device role of the static topology
    #[arg(short, long)]
    role: Option<DeviceRole>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "mud-forwarder.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Send a MUD notification
    Send {
        /// Forwarder address
        #[arg(long, default_value = "[::1]:1234")]
        to: SocketAddr,

        /// MUD URL to announce
        #[arg(long)]
        url: String,

        /// Device address to announce
        #[arg(long)]
        address: IpAddr,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
            Commands::Send { to, url, address } => cmd_send(to, &url, address),
        };
    }

    let config = build_config(&args)?;
    run(config, &args.mesh_addresses)
}

fn build_config(args: &Args) -> Result<ForwarderConfig, Box<dyn std::error::Error>> {
    let mut config = match args.config {
        Some(ref path) => ForwarderConfig::from_file(path)?,
        None => ForwarderConfig::default(),
    };

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if args.own_address.is_some() {
        config.own_address = args.own_address;
    }
    if let Some(role) = args.role {
        config.initial_role = role;
    }
    config.log_level = args.log_level.clone();
    config.validate()?;
    Ok(config)
}

fn run(
    config: ForwarderConfig,
    mesh_addresses: &[Ipv6Addr],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut topology = StaticTopology::new(DeviceRole::Detached);
    for address in mesh_addresses {
        topology.add_address(UnicastAddress {
            address: *address,
            mesh_local: true,
            rloc: false,
        });
    }
    let mut registry = LocalServiceRegistry::new();

    let endpoint = UdpEndpoint::new().with_read_timeout(POLL_INTERVAL);
    let mut forwarder = Forwarder::new(config.clone(), endpoint, LogSink)?;
    forwarder.start()?;

    println!("MUD Forwarder v{}", env!("CARGO_PKG_VERSION"));
    println!("=====================================");
    println!("Listening: {}", config.listen_addr());
    println!("Role:      {}", config.initial_role);
    println!(
        "Service:   enterprise {} data {:02x?}",
        config.enterprise_number, config.service_data
    );

    // Replay the configured role as a transition so the advertiser sees it.
    let previous = topology.set_role(config.initial_role);
    match forwarder.on_topology_changed(
        previous,
        topology.role(),
        ChangedFlags::ROLE_CHANGED | ChangedFlags::IP6_ADDRESS_ADDED,
        &topology,
        &mut registry,
    ) {
        Some(Ok(_)) => println!("Record:    registered"),
        Some(Err(e)) => println!("Record:    NOT registered ({})", e),
        None => println!("Record:    not advertised (role {})", topology.role()),
    }
    println!();
    println!("Press Ctrl+C to stop...");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;

    while running.load(Ordering::SeqCst) {
        if let Err(e) = forwarder.poll() {
            tracing::warn!("Receive failed: {}", e);
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    println!("\nShutting down...");
    forwarder.stop();

    println!("\nFinal Statistics:");
    print_stats(&forwarder.stats());
    Ok(())
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = ForwarderConfig {
        own_address: Some("fdde:ad00:beef::1".parse()?),
        initial_role: DeviceRole::Router,
        ..Default::default()
    };

    let toml_str = toml::to_string_pretty(&config)?;
    let content = format!(
        r#"# MUD Forwarder Configuration
# Generated by mud-forwarder gen-config

{}
"#,
        toml_str
    );

    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match ForwarderConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Listen:    {}", config.listen_addr());
            println!("Role:      {}", config.initial_role);
            println!(
                "Own addr:  {}",
                config
                    .own_address
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| format!("auto ({:?})", config.address_selection))
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_send(to: SocketAddr, url: &str, address: IpAddr) -> Result<(), Box<dyn std::error::Error>> {
    let octets = match address {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    };
    let payload = notification::encode(url, &octets)
        .ok_or_else(|| format!("MUD URL of {} bytes is too long to encode", url.len()))?;

    let local: SocketAddr = if to.is_ipv6() {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    } else {
        ([0, 0, 0, 0], 0).into()
    };
    let socket = UdpSocket::bind(local)?;
    let sent = socket.send_to(&payload, to)?;
    println!("Sent {} bytes to {}", sent, to);
    Ok(())
}

fn print_stats(stats: &ForwarderStatsSnapshot) {
    println!("--- Forwarder Statistics ---");
    println!(
        "  {} datagrams ({} bytes), {} complete, {} incomplete",
        stats.datagrams_received,
        stats.bytes_received,
        stats.notifications_complete,
        stats.notifications_incomplete
    );
    println!(
        "  {} registrations, {} registration failures, uptime {}s",
        stats.registrations, stats.registration_failures, stats.uptime_secs
    );
}
