//! epmd-client - Erlang Port Mapper Daemon client
//!
//! Registers nodes with a port mapper daemon and looks up their ports.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use epmd_client::config::{self, Config};
use epmd_client::network::{lookup_port, AliveSession, EpmdAddr};
use epmd_client::protocol::PortLookupResponse;

/// epmd-client - Erlang Port Mapper Daemon client
#[derive(Parser)]
#[command(name = "epmd-client")]
#[command(author = "epmd-client Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Register nodes with EPMD and look up their ports", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// EPMD host (overrides configuration)
    #[arg(long, global = true)]
    epmd_host: Option<String>,

    /// EPMD port (overrides configuration)
    #[arg(long, global = true)]
    epmd_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a node and hold the registration until interrupted
    Register {
        /// Node name to register
        #[arg(short, long)]
        name: Option<String>,

        /// Port the node listens on
        #[arg(short, long)]
        port: Option<u16>,

        /// Extra data sent with the registration
        #[arg(long)]
        extra: Option<String>,
    },

    /// Look up the port of a registered node
    Lookup {
        /// Node name to resolve
        name: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    // Initialize logging
    let filter = if cli.verbose || config.general.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    if let Some(host) = cli.epmd_host {
        config.epmd.host = host;
    }
    if let Some(port) = cli.epmd_port {
        config.epmd.port = port;
    }

    match cli.command {
        Commands::Register { name, port, extra } => {
            run_register(config, name, port, extra).await?;
        }
        Commands::Lookup { name, json } => {
            run_lookup(config, name, json).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                if let Some(path) = output {
                    config::sample_config().save(&path)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", config::generate_sample_config()?);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

/// Bound `fut` by the configured timeout, if any
async fn bounded<T>(timeout: Option<Duration>, fut: impl Future<Output = T>) -> anyhow::Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .with_context(|| format!("EPMD did not answer within {:?}", limit)),
        None => Ok(fut.await),
    }
}

/// Register a node and keep it registered
async fn run_register(
    config: Config,
    name: Option<String>,
    port: Option<u16>,
    extra: Option<String>,
) -> anyhow::Result<()> {
    let name = name
        .or(config.node.name.clone())
        .context("No node name given; use --name or set node.name")?;
    let port = port
        .or(config.node.port)
        .context("No node port given; use --port or set node.port")?;
    let extra = extra.unwrap_or(config.node.extra.clone());
    let daemon: EpmdAddr = config.epmd.addr();

    let session = AliveSession::new(name.clone(), port, daemon.clone()).with_extra(extra);
    let mut handle = bounded(config.epmd.timeout(), session.register()).await??;

    println!(
        "Registered '{}' on port {} with EPMD at {} (creation {})",
        name,
        port,
        daemon,
        handle.creation()
    );
    println!("Press Ctrl+C to unregister.");

    tokio::select! {
        _ = handle.closed() => {
            anyhow::bail!("EPMD at {} closed the registration connection", daemon);
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nUnregistering...");
        }
    }

    handle.close().await;
    tracing::info!("Registration of '{}' released", name);

    Ok(())
}

/// Resolve a node name and print the result
async fn run_lookup(config: Config, name: String, json: bool) -> anyhow::Result<()> {
    let daemon = config.epmd.addr();
    let response = bounded(
        config.epmd.timeout(),
        lookup_port(name.clone(), &daemon.host, daemon.port),
    )
    .await??;

    match response {
        PortLookupResponse::Found(info) => {
            let summary = info.summary();
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "{} port {} (type {}, protocol {}, versions {}-{})",
                    summary.name,
                    summary.port,
                    summary.node_type,
                    summary.protocol,
                    summary.lowest_version,
                    summary.highest_version
                );
            }
            Ok(())
        }
        PortLookupResponse::NotFound { result } => {
            anyhow::bail!("Node '{}' not registered with EPMD at {} (result {})", name, daemon, result)
        }
    }
}
