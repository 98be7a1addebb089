use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use fanout_server::config::{FileConfig, TransportConfig, load_config};
use fanout_server::probe::{ProbeError, run_probe};
use fanout_server::{AppState, build_router, serve};

#[derive(Parser)]
#[command(name = "fanout")]
#[command(about = "Real-time WebSocket fan-out hub")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hub server in the foreground (default)
    Serve(ServeArgs),

    /// Check that a running server relays messages between two clients
    Probe(ProbeArgs),
}

#[derive(Parser, Default)]
struct ServeArgs {
    /// Host to bind to (overrides the config file)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the server, 0 = auto-select (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file (defaults to ./fanout.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not echo a client's messages back to itself
    #[arg(long)]
    exclude_sender: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Parser)]
struct ProbeArgs {
    /// WebSocket URL of the server to check
    #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
    url: String,

    /// Seconds to wait for the relayed message
    #[arg(long, default_value = "2")]
    timeout_secs: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => run_server(ServeArgs::default()).await,
        Some(Commands::Serve(args)) => run_server(args).await,
        Some(Commands::Probe(args)) => run_probe_command(args).await,
    }
}

fn init_tracing(debug: bool) {
    let default_directive = if debug {
        "fanout=debug,fanout_server=debug,fanout_hub=debug,tower_http=debug,info"
    } else {
        "fanout=info,fanout_server=info,fanout_hub=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();
}

async fn run_server(args: ServeArgs) -> Result<()> {
    init_tracing(args.debug);

    let mut file_config: FileConfig = load_config(args.config.as_deref())
        .extract()
        .context("Failed to load configuration")?;
    if let Some(host) = args.host {
        file_config.server.host = host;
    }
    if let Some(port) = args.port {
        file_config.server.port = port;
    }
    if args.exclude_sender {
        file_config.hub.exclude_sender = true;
    }
    file_config.validate()?;

    let hub_config = file_config.hub.to_runtime();
    info!(
        exclude_sender = hub_config.exclude_sender,
        send_timeout = ?hub_config.send_timeout,
        validate_draw_events = file_config.transport.validate_draw_events,
        "Starting fanout hub"
    );

    let state = AppState::new(
        hub_config,
        TransportConfig::from_file(&file_config.transport),
    );
    let app = build_router(state.clone(), &file_config.server.ws_path);

    let addr = file_config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    info!("Fanout listening on http://{}", actual_addr);
    info!("  GET {} - WebSocket endpoint", file_config.server.ws_path);
    info!("  GET /health - Health status");
    info!("  GET /metrics - Server and hub counters");

    let hub = state.hub.clone();
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Received shutdown signal, closing connections...");
        if let Err(e) = hub.shutdown().await {
            warn!("Hub shutdown failed: {}", e);
        }
    };

    serve(listener, app, shutdown_signal).await?;
    info!("Server stopped");
    Ok(())
}

async fn run_probe_command(args: ProbeArgs) -> Result<()> {
    init_tracing(args.debug);

    let wait = Duration::from_secs(args.timeout_secs);
    match run_probe(&args.url, wait).await {
        Ok(report) => {
            println!(
                "OK: broadcast received in {:?} after {} attempt(s)",
                report.latency, report.attempts
            );
            Ok(())
        }
        Err(ProbeError::Unavailable) => {
            anyhow::bail!("No server reachable at {}", args.url)
        }
        Err(e) => Err(e).context(format!("Probe against {} failed", args.url)),
    }
}
