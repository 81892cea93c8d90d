//! Resource registry, collector, and memory-pressure monitor.
//!
//! `reclaim-rs` tracks long-lived application resources (decoded images,
//! menus, tooltips, anything with a teardown step) in a [`Registry`] keyed by
//! string id. Owners register a resource with an optional cleanup callback
//! and touch it while it is in use. Sweeps evict entries selected by a
//! predicate and run their cleanups exactly once.
//!
//! A [`Collector`] binds a registry to a [`MemoryProbe`] and a two-state
//! pressure heuristic (`Normal` / `HighUsage`). When memory usage crosses the
//! threshold it collects everything once and re-checks shortly after. A
//! background task started with [`Collector::start`] drives the periodic
//! check, an optional forced-collection interval, and re-evaluation when a
//! [`VisibilitySignal`] turns visible.
//!
//! # Getting started
//!
//! ```ignore
//! use std::sync::Arc;
//! use reclaim_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let config = CollectorConfig::from_file("reclaim.json".as_ref())?;
//!     let collector = Arc::new(
//!         Collector::new(config, default_probe()).with_event_handler(LoggingHandler),
//!     );
//!
//!     let banner = collector
//!         .registry()
//!         .register_with_cleanup(resource_id("image", "banner"), || drop_texture());
//!
//!     let visibility = VisibilitySignal::default();
//!     let task = collector.start(Some(&visibility));
//!
//!     banner.touch();
//!     visibility.set(Visibility::Hidden);
//!
//!     println!("{} image(s) freed", collector.collect_by_type("image"));
//!     task.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Register and sweep resources:** [`Registry`], [`ResourceHandle`], and
//!   the predicate helpers [`untouched`](registry::untouched),
//!   [`idle_for`](registry::idle_for), [`of_type`](registry::of_type).
//!   Type tags follow the naming convention in [`registry::naming`].
//!
//! - **Read memory usage:** implement [`MemoryProbe`] or use
//!   [`ProcProbe`](memory::ProcProbe) on Linux. [`NoProbe`](memory::NoProbe)
//!   is the no-capability variant; the heuristic stays `Normal` with it.
//!
//! - **Run the heuristic:** [`Collector::evaluate`] by hand, or
//!   [`Collector::start`] for the background task.
//!
//! - **Observe decisions:** implement
//!   [`EventHandler`](collector::events::EventHandler), or use
//!   [`LoggingHandler`](collector::events::LoggingHandler).
//!
//! - **Show recent activity in a frontend:** install
//!   [`ActivityLayer`](logging::ActivityLayer) in your tracing subscriber and
//!   read its [`LogBuffer`](logging::LogBuffer).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`registry`] | [`Registry`], handles, naming convention, staleness predicates |
//! | [`memory`] | Probes, [`MemorySnapshot`](memory::MemorySnapshot), throttled sampling, the pressure state machine |
//! | [`collector`] | [`Collector`], config, events, the background scheduler |
//! | [`logging`] | Tracing layer capturing log lines for frontends |

pub mod collector;
pub mod logging;
pub mod memory;
pub mod prelude;
pub mod registry;

pub use collector::{Collector, CollectorConfig, CollectorTask, Visibility, VisibilitySignal};
pub use memory::{MemoryProbe, MemorySnapshot, default_probe};
pub use registry::{Registry, ResourceHandle, ResourceInfo};
