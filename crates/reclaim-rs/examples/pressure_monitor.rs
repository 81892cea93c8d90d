//! Background collector driven by a scripted memory curve.
//!
//! The probe reports 40%, 55%, then 85% usage. The third check crosses the
//! default 70% threshold, so the collector evicts everything once and
//! re-checks a second later.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example pressure_monitor
//! ```

use std::sync::Arc;
use std::time::Duration;

use reclaim_rs::memory::ScriptedProbe;
use reclaim_rs::prelude::*;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter("reclaim_rs=debug").init();

    // 1. A probe replaying a fixed memory curve against a 512 MiB limit.
    let probe = Arc::new(ScriptedProbe::from_usage(&[0.40, 0.55, 0.85, 0.60], 512 << 20));

    // 2. Check every 500 ms instead of the default 5 s.
    let config = CollectorConfig::new().with_monitor_interval(Duration::from_millis(500));
    let collector = Arc::new(Collector::new(config, probe).with_event_handler(LoggingHandler));

    for i in 0..10 {
        collector
            .registry()
            .register_with_cleanup(resource_id("image", i), move || println!("freed image {i}"));
    }

    // 3. Run the background task for a few checks, then tear it down.
    let task = collector.start(None);
    tokio::time::sleep(Duration::from_secs(3)).await;
    task.stop().await;

    println!(
        "pressure: {:?}, live resources: {}",
        collector.pressure_state(),
        collector.registry().len()
    );
}
