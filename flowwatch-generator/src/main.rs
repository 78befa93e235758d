use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use flowwatch_generator::{server, GeneratorSettings, MetricGenerator, ServerState, Subscribers};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "flowwatch-generator")]
#[command(about = "Stream synthetic per-node network telemetry over a WebSocket")]
struct Args {
    /// Settings file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Tick interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Initial scenario mode (NORMAL, CONGESTION, OUTAGE, FLAP)
    #[arg(short, long)]
    mode: Option<String>,

    /// Comma-separated node ids
    #[arg(short, long, value_delimiter = ',')]
    nodes: Option<Vec<String>>,

    /// RNG seed for reproducible streams
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let mut settings =
        GeneratorSettings::load(args.config.as_deref()).context("failed to load settings")?;

    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(interval_ms) = args.interval_ms {
        settings.interval_ms = interval_ms;
    }
    if let Some(mode) = args.mode {
        settings.mode = mode;
    }
    if let Some(nodes) = args.nodes {
        settings.nodes = nodes;
    }
    if args.seed.is_some() {
        settings.seed = args.seed;
    }
    settings.validate().context("invalid command-line settings")?;

    let generator = Arc::new(MetricGenerator::from_settings(&settings));
    let subscribers = Arc::new(Subscribers::new());
    info!(
        nodes = ?generator.nodes(),
        mode = %generator.mode(),
        interval_ms = settings.interval_ms,
        "generator configured"
    );

    let listener = server::bind(&settings.listen_addr()).await?;
    let emission = generator.start(subscribers.clone());
    let state = ServerState::new(generator, subscribers);

    tokio::select! {
        result = server::serve(listener, state) => result?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }

    emission.stop();
    Ok(())
}
