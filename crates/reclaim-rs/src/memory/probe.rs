//! The memory-introspection capability.
//!
//! Environments differ in what they expose: some report resident memory and
//! a limit, some report nothing. [`MemoryProbe`] hides the difference. A probe
//! that cannot read counters returns `None`; callers treat that as
//! "capability unavailable" and degrade, never as an error.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Raw byte counters reported by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryCounters {
    pub used: u64,
    pub total: u64,
    pub limit: u64,
}

impl MemoryCounters {
    pub fn new(used: u64, total: u64, limit: u64) -> Self {
        Self { used, total, limit }
    }
}

/// Source of memory counters.
///
/// Implementations must be cheap enough to call on every monitor tick; the
/// [`SnapshotSampler`](super::SnapshotSampler) throttles them further.
pub trait MemoryProbe: Send + Sync {
    /// Current counters, or `None` when the environment does not expose them.
    fn read(&self) -> Option<MemoryCounters>;

    /// Short name used in snapshots and logs.
    fn name(&self) -> &str;
}

/// Probe for environments without memory counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbe;

impl MemoryProbe for NoProbe {
    fn read(&self) -> Option<MemoryCounters> {
        None
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Probe that replays a fixed script of readings.
///
/// Each read pops the next reading; once the script runs out the last
/// reading repeats. More readings can be appended with
/// [`push`](Self::push). Useful for tests and simulated workloads.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    script: Mutex<Script>,
    reads: AtomicU64,
}

#[derive(Debug, Default)]
struct Script {
    pending: VecDeque<MemoryCounters>,
    last: Option<MemoryCounters>,
}

impl ScriptedProbe {
    pub fn new(readings: impl IntoIterator<Item = MemoryCounters>) -> Self {
        Self {
            script: Mutex::new(Script {
                pending: readings.into_iter().collect(),
                last: None,
            }),
            reads: AtomicU64::new(0),
        }
    }

    /// Script expressed as usage fractions of `limit` bytes.
    pub fn from_usage(usage: &[f64], limit: u64) -> Self {
        Self::new(usage.iter().map(|&u| at_usage(u, limit)))
    }

    /// Append a reading to the end of the script.
    pub fn push(&self, counters: MemoryCounters) {
        self.lock().pending.push_back(counters);
    }

    /// Append a reading expressed as a usage fraction of `limit` bytes.
    pub fn push_usage(&self, usage: f64, limit: u64) {
        self.push(at_usage(usage, limit));
    }

    /// How many times the probe has been read.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MemoryProbe for ScriptedProbe {
    fn read(&self) -> Option<MemoryCounters> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let mut script = self.lock();
        if let Some(next) = script.pending.pop_front() {
            script.last = Some(next);
        }
        script.last
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn at_usage(usage: f64, limit: u64) -> MemoryCounters {
    let used = (usage.max(0.0) * limit as f64).round() as u64;
    MemoryCounters::new(used, limit, limit)
}
