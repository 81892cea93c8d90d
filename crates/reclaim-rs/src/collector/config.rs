//! Configuration for a [`Collector`](super::Collector).
//!
//! Every field has a default. Override with the builder methods, set fields
//! directly, or load a JSON file.
//!
//! # Examples
//!
//! ```ignore
//! let config = CollectorConfig::new()
//!     .with_threshold(0.8)
//!     .with_auto_collect_interval(Some(Duration::from_secs(60)))
//!     .with_verbose(true);
//! ```
//!
//! The JSON form uses camelCase keys and milliseconds for durations:
//!
//! ```json
//! {
//!   "touchOnRender": true,
//!   "verbose": false,
//!   "highMemoryThreshold": 0.7,
//!   "autoCollectOnHighMemory": true,
//!   "optimizeOnVisibilityChange": true,
//!   "autoCollectInterval": null,
//!   "monitorInterval": 5000
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::memory::DEFAULT_SNAPSHOT_THROTTLE;
use crate::memory::pressure::DEFAULT_HIGH_MEMORY_THRESHOLD;
use crate::registry::RegistryOptions;

/// Default period of the pressure check.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(5);
/// Default delay before re-checking pressure after an automatic collection.
pub const DEFAULT_RECHECK_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    /// Count each registration as a touch. Default: `true`.
    pub touch_on_register: bool,
    /// Log registry activity at `info`. Default: `false`.
    pub verbose: bool,
    /// Usage fraction above which memory is high. Default: `0.7`.
    pub high_memory_threshold: f64,
    /// Collect everything once when usage turns high. Default: `true`.
    pub auto_collect_on_high_memory: bool,
    /// Re-check pressure when the visibility signal turns visible.
    /// Default: `true`.
    pub optimize_on_visibility_change: bool,
    /// Period of forced collection, independent of pressure.
    /// Default: `None` (disabled).
    pub auto_collect_interval: Option<Duration>,
    /// Period of the pressure check. Default: 5 s.
    pub monitor_interval: Duration,
    /// Window in which snapshot requests reuse the last probe read.
    /// Default: 1 s.
    pub snapshot_throttle: Duration,
    /// Delay before the one re-check after an automatic collection.
    /// Default: 1 s.
    pub recheck_delay: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            touch_on_register: true,
            verbose: false,
            high_memory_threshold: DEFAULT_HIGH_MEMORY_THRESHOLD,
            auto_collect_on_high_memory: true,
            optimize_on_visibility_change: true,
            auto_collect_interval: None,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            snapshot_throttle: DEFAULT_SNAPSHOT_THROTTLE,
            recheck_delay: DEFAULT_RECHECK_DELAY,
        }
    }
}

impl CollectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_touch_on_register(mut self, touch: bool) -> Self {
        self.touch_on_register = touch;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.high_memory_threshold = threshold;
        self
    }

    pub fn with_auto_collect(mut self, enabled: bool) -> Self {
        self.auto_collect_on_high_memory = enabled;
        self
    }

    pub fn with_visibility_trigger(mut self, enabled: bool) -> Self {
        self.optimize_on_visibility_change = enabled;
        self
    }

    pub fn with_auto_collect_interval(mut self, interval: Option<Duration>) -> Self {
        self.auto_collect_interval = interval;
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub fn with_snapshot_throttle(mut self, throttle: Duration) -> Self {
        self.snapshot_throttle = throttle;
        self
    }

    pub fn with_recheck_delay(mut self, delay: Duration) -> Self {
        self.recheck_delay = delay;
        self
    }

    /// Registry options implied by this config.
    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            touch_on_register: self.touch_on_register,
            verbose: self.verbose,
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), String> {
        let t = self.high_memory_threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(format!("highMemoryThreshold must be within [0, 1], got {t}"));
        }
        if self.monitor_interval.is_zero() {
            return Err("monitorInterval must be greater than zero".into());
        }
        if self.auto_collect_interval.is_some_and(|d| d.is_zero()) {
            return Err("autoCollectInterval must be greater than zero or null".into());
        }
        Ok(())
    }

    /// Parse and validate the JSON form.
    pub fn from_json_str(json: &str) -> Result<Self, String> {
        let file: ConfigFile =
            serde_json::from_str(json).map_err(|e| format!("invalid collector config: {e}"))?;
        let config = Self::from(file);
        config.validate()?;
        Ok(config)
    }

    /// Load, parse, and validate a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        Self::from_json_str(&json)
    }
}

/// On-disk JSON shape. Durations are milliseconds.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct ConfigFile {
    touch_on_render: bool,
    verbose: bool,
    high_memory_threshold: f64,
    auto_collect_on_high_memory: bool,
    optimize_on_visibility_change: bool,
    auto_collect_interval: Option<u64>,
    monitor_interval: u64,
    snapshot_throttle: u64,
    recheck_delay: u64,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let d = CollectorConfig::default();
        Self {
            touch_on_render: d.touch_on_register,
            verbose: d.verbose,
            high_memory_threshold: d.high_memory_threshold,
            auto_collect_on_high_memory: d.auto_collect_on_high_memory,
            optimize_on_visibility_change: d.optimize_on_visibility_change,
            auto_collect_interval: d.auto_collect_interval.map(|i| i.as_millis() as u64),
            monitor_interval: d.monitor_interval.as_millis() as u64,
            snapshot_throttle: d.snapshot_throttle.as_millis() as u64,
            recheck_delay: d.recheck_delay.as_millis() as u64,
        }
    }
}

impl From<ConfigFile> for CollectorConfig {
    fn from(f: ConfigFile) -> Self {
        Self {
            touch_on_register: f.touch_on_render,
            verbose: f.verbose,
            high_memory_threshold: f.high_memory_threshold,
            auto_collect_on_high_memory: f.auto_collect_on_high_memory,
            optimize_on_visibility_change: f.optimize_on_visibility_change,
            auto_collect_interval: f.auto_collect_interval.map(Duration::from_millis),
            monitor_interval: Duration::from_millis(f.monitor_interval),
            snapshot_throttle: Duration::from_millis(f.snapshot_throttle),
            recheck_delay: Duration::from_millis(f.recheck_delay),
        }
    }
}
