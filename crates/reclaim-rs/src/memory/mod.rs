//! Memory introspection: probes, snapshots, and the pressure heuristic.
//!
//! 1. **[`probe`]**: the [`MemoryProbe`] capability trait, with a
//!    no-capability variant ([`NoProbe`]) and a scripted fake
//!    ([`ScriptedProbe`]).
//! 2. **[`procfs`]**: [`ProcProbe`] reads resident memory and limits from
//!    `/proc` and cgroups on Linux.
//! 3. **[`pressure`]**: the `Normal` / `HighUsage` state machine fed by
//!    snapshots.
//!
//! [`SnapshotSampler`] sits between a probe and its callers and throttles
//! probe reads.

pub mod pressure;
pub mod probe;
pub mod procfs;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

pub use pressure::{PressureMonitor, PressureState, Transition};
pub use probe::{MemoryCounters, MemoryProbe, NoProbe, ScriptedProbe};
pub use procfs::ProcProbe;

/// Default window during which repeated snapshot requests reuse the last
/// probe read.
pub const DEFAULT_SNAPSHOT_THROTTLE: Duration = Duration::from_secs(1);

/// A point-in-time memory reading with derived usage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemorySnapshot {
    /// Bytes in use.
    pub used: u64,
    /// Bytes available to the environment in total.
    pub total: u64,
    /// Bytes the process may use before it is considered out of memory.
    pub limit: u64,
    /// `used / limit` as a fraction.
    pub usage: f64,
    pub taken_at: DateTime<Utc>,
    /// Name of the probe that produced the reading.
    pub probe: String,
}

impl MemorySnapshot {
    /// Derive a snapshot from raw counters.
    ///
    /// Returns `None` for a zero limit: usage would be meaningless.
    pub fn from_counters(counters: MemoryCounters, probe: &str) -> Option<Self> {
        if counters.limit == 0 {
            return None;
        }
        Some(Self {
            used: counters.used,
            total: counters.total,
            limit: counters.limit,
            usage: counters.used as f64 / counters.limit as f64,
            taken_at: Utc::now(),
            probe: probe.to_string(),
        })
    }

    /// Usage on a 0-100 scale.
    pub fn usage_percent(&self) -> f64 {
        self.usage * 100.0
    }

    /// Whether usage is strictly above `threshold`.
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.usage > threshold
    }

    /// One-line summary for logs.
    pub fn to_log_string(&self) -> String {
        format!(
            "memory {:.1}% ({} / {} MiB, total {} MiB, probe {})",
            self.usage_percent(),
            self.used / (1024 * 1024),
            self.limit / (1024 * 1024),
            self.total / (1024 * 1024),
            self.probe,
        )
    }
}

/// Throttled access to a [`MemoryProbe`].
///
/// [`sample`](Self::sample) reads the probe at most once per throttle window
/// and serves the cached result in between. An unavailable reading (`None`)
/// is cached the same way.
pub struct SnapshotSampler {
    probe: Arc<dyn MemoryProbe>,
    throttle: Duration,
    last: Option<(Instant, Option<MemorySnapshot>)>,
}

impl SnapshotSampler {
    pub fn new(probe: Arc<dyn MemoryProbe>, throttle: Duration) -> Self {
        Self {
            probe,
            throttle,
            last: None,
        }
    }

    /// Snapshot, reusing the previous reading if it is younger than the
    /// throttle window.
    pub fn sample(&mut self) -> Option<MemorySnapshot> {
        if let Some((at, cached)) = &self.last
            && at.elapsed() < self.throttle
        {
            return cached.clone();
        }
        self.refresh()
    }

    /// Read the probe now, ignoring the throttle window.
    pub fn refresh(&mut self) -> Option<MemorySnapshot> {
        let snapshot = self
            .probe
            .read()
            .and_then(|c| MemorySnapshot::from_counters(c, self.probe.name()));
        self.last = Some((Instant::now(), snapshot.clone()));
        snapshot
    }

    /// The most recent reading, without touching the probe.
    pub fn last(&self) -> Option<&MemorySnapshot> {
        self.last.as_ref().and_then(|(_, s)| s.as_ref())
    }

    pub fn probe_name(&self) -> &str {
        self.probe.name()
    }
}

/// The best probe the current environment supports.
///
/// [`ProcProbe`] when `/proc` is readable, otherwise [`NoProbe`].
pub fn default_probe() -> Arc<dyn MemoryProbe> {
    match ProcProbe::detect() {
        Some(probe) => Arc::new(probe),
        None => Arc::new(NoProbe),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn snapshot_derives_usage_from_limit() {
        let snap =
            MemorySnapshot::from_counters(MemoryCounters::new(50 * MIB, 400 * MIB, 100 * MIB), "t")
                .unwrap();
        assert!((snap.usage - 0.5).abs() < 1e-9);
        assert!((snap.usage_percent() - 50.0).abs() < 1e-9);
        assert!(snap.exceeds(0.4));
        assert!(!snap.exceeds(0.5));
        assert_eq!(snap.probe, "t");
    }

    #[test]
    fn zero_limit_is_unavailable() {
        assert!(MemorySnapshot::from_counters(MemoryCounters::new(1, 1, 0), "t").is_none());
    }

    #[test]
    fn log_string_mentions_percent() {
        let snap =
            MemorySnapshot::from_counters(MemoryCounters::new(75 * MIB, 100 * MIB, 100 * MIB), "t")
                .unwrap();
        assert!(snap.to_log_string().starts_with("memory 75.0%"));
    }

    #[tokio::test(start_paused = true)]
    async fn sampler_throttles_probe_reads() {
        let probe = Arc::new(ScriptedProbe::from_usage(&[0.1, 0.2, 0.3], 1000));
        let mut sampler = SnapshotSampler::new(probe.clone(), Duration::from_secs(1));

        let first = sampler.sample().unwrap();
        let again = sampler.sample().unwrap();
        assert_eq!(probe.reads(), 1);
        assert_eq!(first.used, again.used);

        tokio::time::advance(Duration::from_millis(1001)).await;
        let later = sampler.sample().unwrap();
        assert_eq!(probe.reads(), 2);
        assert_eq!(later.used, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_bypasses_throttle() {
        let probe = Arc::new(ScriptedProbe::from_usage(&[0.1, 0.9], 1000));
        let mut sampler = SnapshotSampler::new(probe.clone(), Duration::from_secs(60));
        sampler.sample();
        let snap = sampler.refresh().unwrap();
        assert_eq!(probe.reads(), 2);
        assert_eq!(snap.used, 900);
        assert_eq!(sampler.last().map(|s| s.used), Some(900));
    }

    #[test]
    fn no_probe_always_none() {
        let mut sampler = SnapshotSampler::new(Arc::new(NoProbe), Duration::ZERO);
        for _ in 0..3 {
            assert!(sampler.sample().is_none());
        }
        assert!(sampler.last().is_none());
        assert_eq!(sampler.probe_name(), "none");
    }
}
