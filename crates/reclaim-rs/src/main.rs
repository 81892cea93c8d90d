//! Run a synthetic resource workload against a collector and report what it
//! reclaimed.
//!
//! The workload registers image, menu, and tooltip resources, touches them at
//! different rates, re-registers images that were evicted (as a renderer
//! would), and flips the visibility signal every few seconds.
//!
//! # Examples
//!
//! ```sh
//! # Ten seconds against real process memory
//! reclaim --duration 10
//!
//! # Replay a memory curve that crosses the 70% threshold
//! reclaim --simulate 0.4,0.5,0.85,0.9,0.6 --monitor-interval-ms 1000
//!
//! # Forced collection every 2 s, JSON report
//! reclaim --auto-collect-interval-ms 2000 --json
//!
//! # Settings from a file, overridden by flags
//! reclaim --config reclaim.json --threshold 0.8 --verbose
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use reclaim_rs::collector::{
    CollectTrigger, Collector, CollectorConfig, CollectorEvent, CompositeEventHandler,
    FnEventHandler, LoggingHandler, Visibility, VisibilitySignal,
};
use reclaim_rs::logging::{ActivityLayer, LogBuffer, LogLevel};
use reclaim_rs::memory::{MemoryProbe, MemorySnapshot, NoProbe, PressureState, ProcProbe, ScriptedProbe};
use reclaim_rs::registry::{RegistryStats, idle_for, resource_id};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Limit used for `--simulate` when `--limit-bytes` is not given.
const SIMULATED_LIMIT: u64 = 1 << 30;
/// Period of the synthetic touch loop.
const WORKLOAD_TICK: Duration = Duration::from_millis(250);
/// Ticks between visibility flips.
const VISIBILITY_FLIP_TICKS: u64 = 12;

/// Run a synthetic workload against a resource collector.
#[derive(Parser)]
#[command(name = "reclaim", version)]
struct Cli {
    // ── Workload ───────────────────────────────────────────────
    /// How long to run, in seconds
    #[arg(long, default_value_t = 10)]
    duration: u64,

    /// Resources registered per type (image, menu, tooltip)
    #[arg(long, default_value_t = 16)]
    resources: usize,

    /// After the run, evict entries idle for at least this many seconds
    #[arg(long)]
    idle_secs: Option<u64>,

    // ── Collector settings ─────────────────────────────────────
    /// JSON config file (camelCase keys, durations in milliseconds)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Usage fraction above which memory is high (0.0 to 1.0)
    #[arg(long)]
    threshold: Option<f64>,

    /// Period of the pressure check, in milliseconds
    #[arg(long)]
    monitor_interval_ms: Option<u64>,

    /// Period of forced collection, in milliseconds
    #[arg(long)]
    auto_collect_interval_ms: Option<u64>,

    /// Do not collect when memory turns high
    #[arg(long)]
    no_auto_collect: bool,

    /// Do not count registration as a touch
    #[arg(long)]
    no_touch_on_register: bool,

    /// Ignore visibility changes
    #[arg(long)]
    no_visibility_trigger: bool,

    // ── Memory probe ───────────────────────────────────────────
    /// Replay these usage fractions instead of reading process memory
    #[arg(long, value_delimiter = ',')]
    simulate: Vec<f64>,

    /// Memory limit in bytes (overrides cgroup and total memory)
    #[arg(long)]
    limit_bytes: Option<u64>,

    // ── Output ─────────────────────────────────────────────────
    /// Log registry activity at info level
    #[arg(long)]
    verbose: bool,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn collector_config(&self) -> Result<CollectorConfig, String> {
        let mut config = match &self.config {
            Some(path) => CollectorConfig::from_file(path)?,
            None => CollectorConfig::default(),
        };
        if let Some(t) = self.threshold {
            config.high_memory_threshold = t;
        }
        if let Some(ms) = self.monitor_interval_ms {
            config.monitor_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.auto_collect_interval_ms {
            config.auto_collect_interval = Some(Duration::from_millis(ms));
        }
        if self.no_auto_collect {
            config.auto_collect_on_high_memory = false;
        }
        if self.no_touch_on_register {
            config.touch_on_register = false;
        }
        if self.no_visibility_trigger {
            config.optimize_on_visibility_change = false;
        }
        if self.verbose {
            config.verbose = true;
        }
        config.validate()?;
        Ok(config)
    }

    fn probe(&self) -> Result<Arc<dyn MemoryProbe>, String> {
        if !self.simulate.is_empty() {
            if let Some(bad) = self.simulate.iter().find(|u| !(0.0..=1.0).contains(*u)) {
                return Err(format!("--simulate values must be within [0, 1], got {bad}"));
            }
            let limit = self.limit_bytes.unwrap_or(SIMULATED_LIMIT);
            return Ok(Arc::new(ScriptedProbe::from_usage(&self.simulate, limit)));
        }
        Ok(match ProcProbe::detect() {
            Some(probe) => match self.limit_bytes {
                Some(limit) => Arc::new(probe.with_limit(limit)),
                None => Arc::new(probe),
            },
            None => Arc::new(NoProbe),
        })
    }
}

/// Per-trigger sweep totals, filled in by the event handler.
#[derive(Debug, Default, Serialize)]
struct SweepTotals {
    manual: usize,
    high_memory: usize,
    interval: usize,
    sweeps: usize,
}

#[derive(Serialize)]
struct CleanupCounts {
    image: usize,
    menu: usize,
    tooltip: usize,
}

#[derive(Serialize)]
struct Report {
    probe: String,
    duration_secs: u64,
    pressure: PressureState,
    snapshot: Option<MemorySnapshot>,
    registry: RegistryStats,
    swept: SweepTotals,
    cleanups: CleanupCounts,
    reregistered: usize,
    idle_collected: Option<usize>,
    warnings: Vec<String>,
}

impl Report {
    fn print(&self) {
        println!("probe:        {}", self.probe);
        println!("duration:     {}s", self.duration_secs);
        println!("pressure:     {:?}", self.pressure);
        match &self.snapshot {
            Some(s) => println!("snapshot:     {}", s.to_log_string()),
            None => println!("snapshot:     unavailable"),
        }
        let r = &self.registry;
        println!(
            "registry:     {} live, {} registered, {} replaced, {} touched",
            r.live, r.registered, r.replaced, r.touched
        );
        println!(
            "collected:    {} total ({} high-memory, {} interval, {} manual) in {} sweep(s)",
            r.collected, self.swept.high_memory, self.swept.interval, self.swept.manual, self.swept.sweeps
        );
        println!(
            "cleanups:     {} image, {} menu, {} tooltip ({} failed)",
            self.cleanups.image, self.cleanups.menu, self.cleanups.tooltip, r.cleanup_failures
        );
        println!("reregistered: {}", self.reregistered);
        if let Some(n) = self.idle_collected {
            println!("idle sweep:   {n}");
        }
        for warning in &self.warnings {
            println!("warning:      {warning}");
        }
    }
}

/// Cleanup counters, one per resource type.
#[derive(Default)]
struct Cleanups {
    image: Arc<AtomicUsize>,
    menu: Arc<AtomicUsize>,
    tooltip: Arc<AtomicUsize>,
}

impl Cleanups {
    fn counter(&self, tag: &str) -> Arc<AtomicUsize> {
        match tag {
            "image" => self.image.clone(),
            "menu" => self.menu.clone(),
            _ => self.tooltip.clone(),
        }
    }

    fn counts(&self) -> CleanupCounts {
        CleanupCounts {
            image: self.image.load(Ordering::SeqCst),
            menu: self.menu.load(Ordering::SeqCst),
            tooltip: self.tooltip.load(Ordering::SeqCst),
        }
    }
}

/// Number of workload ticks in `duration_secs`.
fn workload_ticks(duration_secs: u64) -> u64 {
    duration_secs.saturating_mul(1000) / WORKLOAD_TICK.as_millis() as u64
}

fn register(collector: &Collector, cleanups: &Cleanups, tag: &str, i: usize) {
    let counter = cleanups.counter(tag);
    collector
        .registry()
        .register_with_cleanup(resource_id(tag, i), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
}

fn init_tracing(verbose: bool) -> Result<LogBuffer, String> {
    let default = if verbose { "reclaim_rs=debug" } else { "reclaim_rs=info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .map_err(|e| format!("invalid log filter: {e}"))?;
    let (activity, buffer) = ActivityLayer::new();
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(activity)
        .try_init()
        .map_err(|e| format!("failed to install tracing subscriber: {e}"))?;
    Ok(buffer)
}

async fn run(cli: Cli) -> Result<(), String> {
    let logs = init_tracing(cli.verbose)?;
    let config = cli.collector_config()?;
    let probe = cli.probe()?;

    let totals = Arc::new(Mutex::new(SweepTotals::default()));
    let sink = totals.clone();
    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(FnEventHandler::new(move |event| {
            if let CollectorEvent::Collected { trigger, ids } = event {
                let mut t = sink.lock().unwrap_or_else(|e| e.into_inner());
                t.sweeps += 1;
                match trigger {
                    CollectTrigger::Manual => t.manual += ids.len(),
                    CollectTrigger::HighMemory => t.high_memory += ids.len(),
                    CollectTrigger::Interval => t.interval += ids.len(),
                }
            }
        }));
    let collector = Arc::new(Collector::new(config, probe).with_event_handler(handler));
    info!(
        probe = %collector.probe_name(),
        threshold = collector.config().high_memory_threshold,
        "starting workload"
    );

    let cleanups = Cleanups::default();
    for tag in ["image", "menu", "tooltip"] {
        for i in 0..cli.resources {
            register(&collector, &cleanups, tag, i);
        }
    }

    let visibility = VisibilitySignal::new(Visibility::Visible);
    let task = collector.start(Some(&visibility));

    let mut reregistered = 0;
    let mut ticker = tokio::time::interval(WORKLOAD_TICK);
    let ticks = workload_ticks(cli.duration);
    for tick in 0..ticks {
        ticker.tick().await;
        let registry = collector.registry();
        // Images: a rotating quarter is on screen each tick.
        for i in (0..cli.resources).filter(|i| *i as u64 % 4 == tick % 4) {
            if !registry.touch(&resource_id("image", i)) {
                register(&collector, &cleanups, "image", i);
                reregistered += 1;
            }
        }
        // Menus: opened occasionally. Tooltips: never touched again.
        if tick % 8 == 0 {
            for i in 0..cli.resources {
                registry.touch(&resource_id("menu", i));
            }
        }
        if tick > 0 && tick % VISIBILITY_FLIP_TICKS == 0 {
            let next = match visibility.current() {
                Visibility::Visible => Visibility::Hidden,
                Visibility::Hidden => Visibility::Visible,
            };
            visibility.set(next);
        }
    }

    let idle_collected = cli
        .idle_secs
        .map(|secs| collector.collect_where(idle_for(Duration::from_secs(secs))));
    task.stop().await;

    let swept = std::mem::take(&mut *totals.lock().unwrap_or_else(|e| e.into_inner()));
    let report = Report {
        probe: collector.probe_name(),
        duration_secs: cli.duration,
        pressure: collector.pressure_state(),
        snapshot: collector.last_snapshot(),
        registry: collector.registry().stats(),
        swept,
        cleanups: cleanups.counts(),
        reregistered,
        idle_collected,
        warnings: logs
            .drain()
            .into_iter()
            .filter(|l| matches!(l.level, LogLevel::Warn | LogLevel::Error))
            .map(|l| format!("[{}] {}", l.time, l.message))
            .collect(),
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("failed to serialize report: {e}"))?;
        println!("{json}");
    } else {
        report.print();
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
