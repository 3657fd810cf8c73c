//! ctx-sidecar - Code Context Engine sidecar service
//!
//! Discovers a free port, publishes it through the port file and serves the
//! sidecar HTTP API until `/shutdown`, SIGINT or SIGTERM.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use ctx_sidecar::server::{self, DEFAULT_BIND_ATTEMPTS};
use ctx_sidecar::telemetry::Console;
use ctx_sidecar::{telemetry, AppState, LogLevel, PortAllocator, PortFile, SidecarConfig};

#[derive(Parser)]
#[command(name = "ctx-sidecar")]
#[command(version)]
#[command(about = "Code Context Engine Sidecar Service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Preferred port to run the service on
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Start of port range to search
    #[arg(long, global = true)]
    port_start: Option<u16>,
    /// End of port range to search
    #[arg(long, global = true)]
    port_end: Option<u16>,
    /// Host to bind to
    #[arg(long, global = true)]
    host: Option<String>,
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevel>,
    /// File the bound port is written to
    #[arg(long, global = true)]
    port_file: Option<PathBuf>,
    /// Append logs to this file as well as the console
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Log to the console only
    #[arg(long, global = true, conflicts_with = "log_file")]
    no_log_file: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sidecar (default)
    Serve,
    /// Print a currently free port of the range and exit
    FindPort,
    /// Print ports of the range in use, or the process holding one port, as JSON
    Ports {
        /// Only report the process holding this port
        #[arg(long)]
        owner: Option<u16>,
    },
}

impl Cli {
    fn resolve_config(&self) -> anyhow::Result<SidecarConfig> {
        let mut config = match &self.config {
            Some(path) => SidecarConfig::load(path)?,
            None => SidecarConfig::default(),
        };

        if let Some(port) = self.port {
            config.port = Some(port);
        }
        if let Some(start) = self.port_start {
            config.port_start = start;
        }
        if let Some(end) = self.port_end {
            config.port_end = end;
        }
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(path) = &self.port_file {
            config.port_file = path.clone();
        }
        if let Some(path) = &self.log_file {
            config.log_file = Some(path.clone());
        }
        if self.no_log_file {
            config.log_file = None;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    let allocator = PortAllocator::from_range(config.port_range()?).with_host(config.host.clone());

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            telemetry::init(config.log_level, Console::Stdout, config.log_file.as_deref())?;
            run(config, allocator).await
        }
        Commands::FindPort => {
            // stdout carries the result only
            telemetry::init(config.log_level, Console::Stderr, None)?;
            match allocator.find_available_port(config.port) {
                Some(port) => {
                    println!("{}", port);
                    Ok(())
                }
                None => std::process::exit(1),
            }
        }
        Commands::Ports { owner } => {
            // stdout carries the result only
            telemetry::init(config.log_level, Console::Stderr, None)?;
            let report = match owner {
                Some(port) => serde_json::to_value(allocator.get_process_using_port(port))?,
                None => serde_json::to_value(allocator.occupancy_report())?,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

async fn run(config: SidecarConfig, allocator: PortAllocator) -> anyhow::Result<()> {
    info!("Starting Code Context Engine Sidecar Service");

    let bound = server::bind_discovered(&allocator, &config.host, config.port, DEFAULT_BIND_ATTEMPTS).await?;
    let Some((listener, port)) = bound else {
        error!(range = %allocator.range(), "No available ports found");
        std::process::exit(1);
    };

    info!(host = %config.host, port, "Starting service");

    // Removed when main returns, on success and on error
    let _port_file = PortFile::create(&config.port_file, port)
        .with_context(|| format!("writing port file {}", config.port_file.display()))?;

    let state = AppState::new(allocator, Some(port)).shared();

    let signal_state = state.clone();
    ctrlc::set_handler(move || {
        info!("Received SIGTERM/SIGINT, shutting down gracefully...");
        signal_state.request_shutdown();
    })?;

    if let Err(e) = server::serve(listener, state).await {
        error!(error = %e, "Service error");
        return Err(e.into());
    }

    info!("Shutting down Code Context Engine Sidecar Service");
    Ok(())
}
