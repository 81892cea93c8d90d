//! Collector dashboard server: end-to-end reclaim-web demo.
//!
//! Starts a collector with a handful of demo resources, serves the REST API
//! and WebSocket stream, and runs until Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p reclaim-web
//! cargo run -p reclaim-web -- --port 8080 --config reclaim.json
//! cargo run -p reclaim-web -- --simulate 0.4,0.6,0.85,0.5
//! ```
//!
//! Then inspect and drive it with curl or wscat:
//!
//! ```bash
//! curl localhost:3001/api/state
//! curl -X POST localhost:3001/api/collect -H 'content-type: application/json' -d '{"type":"image"}'
//! curl -X POST localhost:3001/api/visibility -H 'content-type: application/json' -d '{"visible":false}'
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use reclaim_rs::logging::ActivityLayer;
use reclaim_rs::memory::{MemoryProbe, ScriptedProbe, default_probe};
use reclaim_rs::prelude::*;
use reclaim_web::{WebBroadcastHandler, WebConfig, spawn_web};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Collector dashboard server.
#[derive(Parser)]
#[command(about = "Serve a resource collector over HTTP and WebSocket")]
struct Args {
    /// Port for the web server.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// JSON collector config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replay these usage fractions instead of reading process memory.
    #[arg(long, value_delimiter = ',')]
    simulate: Vec<f64>,

    /// Demo resources registered per type.
    #[arg(long, default_value_t = 8)]
    resources: usize,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();

    // 1. Tracing: stderr output plus a buffer for dashboard snapshots.
    let (activity, logs) = ActivityLayer::new();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(activity)
        .try_init()
        .map_err(|e| format!("failed to install tracing subscriber: {e}"))?;

    // 2. Collector config and probe.
    let config = match &args.config {
        Some(path) => CollectorConfig::from_file(path)?,
        None => CollectorConfig::default(),
    };
    let probe: Arc<dyn MemoryProbe> = if args.simulate.is_empty() {
        default_probe()
    } else {
        Arc::new(ScriptedProbe::from_usage(&args.simulate, 1 << 30))
    };

    // 3. Broadcast channel and event handlers.
    let web_config = WebConfig {
        bind_addr: ([127, 0, 0, 1], args.port).into(),
        ..Default::default()
    };
    let (ws_tx, _) = web_config.broadcast_channel();
    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(WebBroadcastHandler::new(ws_tx.clone()));
    let collector = Arc::new(Collector::new(config, probe).with_event_handler(handler));

    // 4. Demo resources.
    for tag in ["image", "menu", "tooltip"] {
        for i in 0..args.resources {
            collector.registry().register_with_cleanup(resource_id(tag, i), move || {
                info!("freed {tag} #{i}");
            });
        }
    }

    // 5. Background task and server.
    let visibility = VisibilitySignal::default();
    let task = collector.start(Some(&visibility));
    let addr = spawn_web(collector.clone(), visibility, Some(logs), ws_tx, web_config).await?;
    println!("Dashboard API: http://{addr}/api/state");
    println!("Event stream:  ws://{addr}/ws");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to listen for Ctrl-C: {e}"))?;

    task.stop().await;
    let stats = collector.registry().stats();
    println!(
        "--- {} live | {} collected | {} cleanup failures ---",
        stats.live, stats.collected, stats.cleanup_failures
    );
    Ok(())
}
