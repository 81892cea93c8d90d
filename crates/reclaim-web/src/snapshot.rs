//! Serializable projection of a [`Collector`] for WebSocket and REST
//! transport.
//!
//! Registry entries carry `tokio::time::Instant` timestamps, which do not
//! serialize; [`ResourceSnapshot`] reports idle time in seconds instead.
//! Captured logs are capped to the most recent entries.

use reclaim_rs::collector::{Collector, CollectorConfig, Visibility, VisibilitySignal};
use reclaim_rs::logging::{LogBuffer, LogLine};
use reclaim_rs::memory::{MemorySnapshot, PressureState};
use reclaim_rs::registry::{RegistryStats, ResourceInfo, type_tag};
use serde::Serialize;

/// Maximum number of log lines included in a snapshot.
const SNAPSHOT_MAX_LOGS: usize = 200;

/// Serializable view of a collector sent over WebSocket or REST.
#[derive(Debug, Serialize)]
pub struct CollectorSnapshot {
    // ── Memory ──
    pub probe: String,
    pub pressure: PressureState,
    pub threshold: f64,
    /// `null` when the probe exposes no counters.
    pub memory: Option<MemorySnapshot>,
    pub visibility: Visibility,

    // ── Registry ──
    pub stats: RegistryStats,
    pub resources: Vec<ResourceSnapshot>,

    // ── Settings ──
    pub config: ConfigSnapshot,

    // ── Logs (capped) ──
    pub logs: Vec<LogLine>,
}

/// Serializable view of one registry entry.
#[derive(Debug, Serialize)]
pub struct ResourceSnapshot {
    pub id: String,
    /// Type tag parsed from the id, if it follows the naming convention.
    pub type_tag: Option<String>,
    pub touched: bool,
    pub touch_count: u64,
    /// Seconds since the last touch (or registration, if never touched).
    pub idle_secs: f64,
    pub has_cleanup: bool,
}

impl From<&ResourceInfo> for ResourceSnapshot {
    fn from(info: &ResourceInfo) -> Self {
        Self {
            id: info.id.clone(),
            type_tag: type_tag(&info.id).map(str::to_string),
            touched: info.touched(),
            touch_count: info.touch_count,
            idle_secs: info.idle.as_secs_f64(),
            has_cleanup: info.has_cleanup,
        }
    }
}

/// Collector settings with durations in milliseconds, matching the JSON
/// config file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub touch_on_render: bool,
    pub verbose: bool,
    pub high_memory_threshold: f64,
    pub auto_collect_on_high_memory: bool,
    pub optimize_on_visibility_change: bool,
    pub auto_collect_interval: Option<u64>,
    pub monitor_interval: u64,
    pub snapshot_throttle: u64,
    pub recheck_delay: u64,
}

impl From<&CollectorConfig> for ConfigSnapshot {
    fn from(c: &CollectorConfig) -> Self {
        Self {
            touch_on_render: c.touch_on_register,
            verbose: c.verbose,
            high_memory_threshold: c.high_memory_threshold,
            auto_collect_on_high_memory: c.auto_collect_on_high_memory,
            optimize_on_visibility_change: c.optimize_on_visibility_change,
            auto_collect_interval: c.auto_collect_interval.map(|d| d.as_millis() as u64),
            monitor_interval: c.monitor_interval.as_millis() as u64,
            snapshot_throttle: c.snapshot_throttle.as_millis() as u64,
            recheck_delay: c.recheck_delay.as_millis() as u64,
        }
    }
}

impl CollectorSnapshot {
    /// Build a snapshot of the collector's current state.
    ///
    /// Memory is the reading the pressure heuristic last saw; capturing
    /// never reads the probe.
    pub fn capture(
        collector: &Collector,
        visibility: &VisibilitySignal,
        logs: Option<&LogBuffer>,
    ) -> Self {
        let config = collector.config();
        Self {
            probe: collector.probe_name(),
            pressure: collector.pressure_state(),
            threshold: config.high_memory_threshold,
            memory: collector.last_snapshot(),
            visibility: visibility.current(),
            stats: collector.registry().stats(),
            resources: collector
                .registry()
                .resources()
                .iter()
                .map(ResourceSnapshot::from)
                .collect(),
            config: ConfigSnapshot::from(config),
            logs: logs
                .map(|buffer| buffer.recent(SNAPSHOT_MAX_LOGS))
                .unwrap_or_default(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reclaim_rs::collector::EvaluationTrigger;
    use reclaim_rs::memory::{NoProbe, ScriptedProbe};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn snapshot_without_probe_has_null_memory() {
        let collector = Collector::new(CollectorConfig::default(), Arc::new(NoProbe));
        collector.registry().register("image-logo");
        collector.registry().register("standalone");

        let snap = CollectorSnapshot::capture(&collector, &VisibilitySignal::default(), None);
        let json = snap.to_json();
        assert!(json["memory"].is_null());
        assert_eq!(json["probe"], "none");
        assert_eq!(json["pressure"], "normal");
        assert_eq!(json["visibility"], "visible");
        assert_eq!(json["stats"]["live"], 2);
        assert_eq!(json["resources"][0]["id"], "image-logo");
        assert_eq!(json["resources"][0]["type_tag"], "image");
        assert!(json["resources"][1]["type_tag"].is_null());
        assert!(json["logs"].as_array().unwrap().is_empty());
    }

    #[test]
    fn capture_matches_the_evaluated_reading() {
        let probe = Arc::new(ScriptedProbe::from_usage(&[0.5, 0.9, 0.5], 1000));
        let collector = Collector::new(
            CollectorConfig::new().with_snapshot_throttle(Duration::ZERO),
            probe.clone(),
        );
        assert!(CollectorSnapshot::capture(&collector, &VisibilitySignal::default(), None)
            .memory
            .is_none());

        collector.evaluate(EvaluationTrigger::Manual);
        let snap = CollectorSnapshot::capture(&collector, &VisibilitySignal::default(), None);
        assert_eq!(snap.memory.as_ref().map(|m| m.used), Some(500));
        assert_eq!(snap.pressure, PressureState::Normal);
        assert_eq!(probe.reads(), 1);

        // The next scripted reading still reaches the heuristic.
        let evaluation = collector.evaluate(EvaluationTrigger::Manual);
        assert_eq!(evaluation.state, PressureState::HighUsage);
    }

    #[test]
    fn config_uses_file_key_names() {
        let config = CollectorConfig::new().with_auto_collect_interval(Some(Duration::from_secs(2)));
        let json = serde_json::to_value(ConfigSnapshot::from(&config)).unwrap();
        assert_eq!(json["touchOnRender"], true);
        assert_eq!(json["autoCollectInterval"], 2000);
        assert_eq!(json["monitorInterval"], 5000);
    }

    #[test]
    fn memory_is_reported_when_available() {
        let collector = Collector::new(
            CollectorConfig::default(),
            Arc::new(ScriptedProbe::from_usage(&[0.25], 4096)),
        );
        let signal = VisibilitySignal::new(Visibility::Hidden);
        collector.evaluate(EvaluationTrigger::Manual);
        let snap = CollectorSnapshot::capture(&collector, &signal, Some(&LogBuffer::new()));
        let memory = snap.memory.as_ref().unwrap();
        assert_eq!(memory.used, 1024);
        assert_eq!(snap.visibility, Visibility::Hidden);
    }
}
