use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use flowwatch::{App, ClientSettings, Mode, WsConnector};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "flowwatch")]
#[command(about = "Follow a live per-node network telemetry feed")]
struct Args {
    /// Settings file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Feed endpoint, e.g. ws://localhost:8092
    #[arg(short, long)]
    url: Option<String>,

    /// Switch the generator to this mode once connected
    #[arg(short, long)]
    mode: Option<String>,

    /// Seconds between summary log lines
    #[arg(short, long, default_value = "5")]
    report_secs: u64,

    /// Write a JSON dump of the store to this file on exit
    #[arg(short, long)]
    export: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let mut settings =
        ClientSettings::load(args.config.as_deref()).context("failed to load settings")?;
    if let Some(url) = args.url {
        settings.ws_url = url;
    }

    if let Some(mode) = &args.mode {
        if mode.parse::<Mode>().is_err() {
            warn!(mode = %mode, "unknown mode, the generator will use NORMAL parameters");
        }
    }

    info!(url = %settings.ws_url, "following feed");
    let mut app = App::new(&settings, Arc::new(WsConnector::new(settings.ws_url.as_str())));
    app.start();

    let mut status = app.connection().status();
    let mut pending_mode = args.mode;
    let mut report = tokio::time::interval(Duration::from_secs(args.report_secs.max(1)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = report.tick() => log_summary(&app),
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let connected = *status.borrow_and_update();
                if connected {
                    if let Some(mode) = app.flush_pending_mode(&mut pending_mode) {
                        info!(mode = %mode, "mode change requested");
                    } else if let Some(mode) = &pending_mode {
                        debug!(mode = %mode, "link closed before the mode request, will retry");
                    }
                }
            }
            _ = &mut ctrl_c => {
                info!("shutting down");
                break;
            }
        }
    }

    app.shutdown();

    if let Some(path) = &args.export {
        export_to_file(&app, path)?;
        info!(path = %path.display(), "store exported");
    }

    Ok(())
}

fn log_summary(app: &App) {
    let summary = app.summary();
    match &summary.aggregate {
        Some(aggregate) => info!(
            connected = summary.connected,
            mode = summary.mode.as_deref().unwrap_or("-"),
            nodes = summary.nodes.len(),
            samples = summary.samples,
            throughput = aggregate.throughput,
            latency_ms = aggregate.latency_ms,
            alert_rate = aggregate.alert_rate,
            "feed summary"
        ),
        None => info!(connected = summary.connected, "no samples yet"),
    }
}

fn export_to_file(app: &App, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&app.export())?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write export to {}", path.display()))?;
    Ok(())
}
