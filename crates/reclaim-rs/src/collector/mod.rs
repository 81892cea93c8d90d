//! The collector: a [`Registry`] bound to a memory probe and the pressure
//! heuristic.
//!
//! A [`Collector`] owns everything one application instance needs:
//!
//! - [`config`]: [`CollectorConfig`] with builder methods and a JSON loader.
//! - [`events`]: the [`EventHandler`] trait and the stock handlers.
//! - [`scheduler`]: [`Collector::start`], the [`VisibilitySignal`], and the
//!   [`CollectorTask`] teardown handle.
//!
//! The collector can be driven by hand (call [`Collector::evaluate`] and the
//! `collect*` methods yourself) or by the background task.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use reclaim_rs::prelude::*;
//!
//! let collector = Arc::new(
//!     Collector::new(CollectorConfig::default(), default_probe())
//!         .with_event_handler(LoggingHandler),
//! );
//! let logo = collector.registry().register_with_cleanup("image-logo", || {});
//! let task = collector.start(None);
//! logo.touch();
//! // ...
//! task.stop().await;
//! ```

pub mod config;
pub mod events;
pub mod scheduler;

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::memory::{
    MemoryProbe, MemorySnapshot, PressureMonitor, PressureState, SnapshotSampler, Transition,
};
use crate::registry::{Registry, ResourceInfo, of_type};

pub use config::CollectorConfig;
pub use events::{
    CollectTrigger, CollectorEvent, CompositeEventHandler, EvaluationTrigger, EventHandler,
    FnEventHandler, LoggingHandler, NoopHandler,
};
pub use scheduler::{CollectorTask, Visibility, VisibilitySignal};

/// Outcome of one pressure evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub trigger: EvaluationTrigger,
    /// `None` when the probe exposes no counters.
    pub snapshot: Option<MemorySnapshot>,
    /// State after this evaluation.
    pub state: PressureState,
    pub transition: Option<Transition>,
    /// Number of entries evicted by an automatic collection, if one ran.
    pub auto_collected: Option<usize>,
}

impl Evaluation {
    /// Whether a follow-up evaluation should be scheduled.
    pub fn needs_recheck(&self) -> bool {
        self.auto_collected.is_some()
    }
}

pub struct Collector {
    config: CollectorConfig,
    registry: Registry,
    sampler: Mutex<SnapshotSampler>,
    pressure: Mutex<PressureMonitor>,
    handler: Box<dyn EventHandler>,
}

impl Collector {
    /// A collector with a fresh registry configured from `config`.
    pub fn new(config: CollectorConfig, probe: Arc<dyn MemoryProbe>) -> Self {
        let registry = Registry::with_options(config.registry_options());
        Self {
            sampler: Mutex::new(SnapshotSampler::new(probe, config.snapshot_throttle)),
            pressure: Mutex::new(PressureMonitor::new(config.high_memory_threshold)),
            registry,
            config,
            handler: Box::new(NoopHandler),
        }
    }

    /// Use an existing registry instead of a fresh one.
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_event_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handler = Box::new(handler);
        self
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current memory snapshot, throttled by
    /// [`snapshot_throttle`](CollectorConfig::snapshot_throttle).
    pub fn get_memory_snapshot(&self) -> Option<MemorySnapshot> {
        lock(&self.sampler).sample()
    }

    /// The most recent snapshot, without reading the probe.
    pub fn last_snapshot(&self) -> Option<MemorySnapshot> {
        lock(&self.sampler).last().cloned()
    }

    pub fn probe_name(&self) -> String {
        lock(&self.sampler).probe_name().to_string()
    }

    pub fn pressure_state(&self) -> PressureState {
        lock(&self.pressure).state()
    }

    /// Sample memory, feed the pressure heuristic, and collect everything
    /// once if this sample moved the state into `HighUsage` and automatic
    /// collection is enabled.
    ///
    /// [`Recheck`](EvaluationTrigger::Recheck) evaluations bypass the
    /// snapshot throttle.
    ///
    /// Readings reach the heuristic in the order they were taken, even when
    /// several threads evaluate at once.
    pub fn evaluate(&self, trigger: EvaluationTrigger) -> Evaluation {
        let (snapshot, transition, state) = {
            // Lock order: sampler, then pressure.
            let mut sampler = lock(&self.sampler);
            let snapshot = match trigger {
                EvaluationTrigger::Recheck => sampler.refresh(),
                _ => sampler.sample(),
            };
            let mut pressure = lock(&self.pressure);
            let transition = pressure.observe(snapshot.as_ref());
            (snapshot, transition, pressure.state())
        };

        self.emit(&CollectorEvent::Evaluated {
            trigger,
            snapshot: snapshot.as_ref(),
            state,
        });
        if let Some(t) = &transition {
            self.emit(&CollectorEvent::PressureChanged {
                transition: t,
                threshold: self.config.high_memory_threshold,
            });
        }

        let auto_collected = transition
            .filter(|t| t.entered_high_usage() && self.config.auto_collect_on_high_memory)
            .map(|_| self.sweep(CollectTrigger::HighMemory, |_| true));

        Evaluation {
            trigger,
            snapshot,
            state,
            transition,
            auto_collected,
        }
    }

    /// Evict every entry. Returns how many were evicted.
    pub fn collect(&self) -> usize {
        self.sweep(CollectTrigger::Manual, |_| true)
    }

    /// Evict every entry matching `predicate`.
    pub fn collect_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&ResourceInfo) -> bool,
    {
        self.sweep(CollectTrigger::Manual, predicate)
    }

    /// Evict every entry of the given type tag.
    pub fn collect_by_type(&self, type_tag: &str) -> usize {
        self.sweep(CollectTrigger::Manual, of_type(type_tag))
    }

    pub(crate) fn sweep<F>(&self, trigger: CollectTrigger, predicate: F) -> usize
    where
        F: Fn(&ResourceInfo) -> bool,
    {
        let report = self.registry.sweep(predicate);
        for (id, message) in &report.failed {
            self.emit(&CollectorEvent::CleanupFailed { id, message });
        }
        self.emit(&CollectorEvent::Collected {
            trigger,
            ids: &report.collected,
        });
        report.count()
    }

    pub(crate) fn emit(&self, event: &CollectorEvent<'_>) {
        self.handler.on_event(event);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
