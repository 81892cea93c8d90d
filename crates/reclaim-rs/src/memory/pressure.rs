//! Threshold-based memory-pressure state machine.
//!
//! Two states. `Normal` moves to `HighUsage` when a snapshot's usage exceeds
//! the threshold; `HighUsage` moves back when a snapshot is at or below it.
//! A missing snapshot (probe unavailable) leaves the state where it is, so a
//! monitor without counters stays `Normal` forever.

use serde::Serialize;

use super::MemorySnapshot;

/// Default usage fraction above which memory counts as high.
pub const DEFAULT_HIGH_MEMORY_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureState {
    #[default]
    Normal,
    HighUsage,
}

/// A state change produced by [`PressureMonitor::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transition {
    pub from: PressureState,
    pub to: PressureState,
    /// Usage fraction of the snapshot that caused the change.
    pub usage: f64,
}

impl Transition {
    pub fn entered_high_usage(&self) -> bool {
        self.to == PressureState::HighUsage
    }
}

#[derive(Debug, Clone)]
pub struct PressureMonitor {
    threshold: f64,
    state: PressureState,
    transitions: u64,
}

impl PressureMonitor {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            state: PressureState::Normal,
            transitions: 0,
        }
    }

    /// Feed one snapshot. Returns the transition if the state changed.
    pub fn observe(&mut self, snapshot: Option<&MemorySnapshot>) -> Option<Transition> {
        let snapshot = snapshot?;
        let next = if snapshot.exceeds(self.threshold) {
            PressureState::HighUsage
        } else {
            PressureState::Normal
        };
        if next == self.state {
            return None;
        }
        let transition = Transition {
            from: self.state,
            to: next,
            usage: snapshot.usage,
        };
        self.state = next;
        self.transitions += 1;
        Some(transition)
    }

    pub fn state(&self) -> PressureState {
        self.state
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Number of state changes observed so far.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }
}

impl Default for PressureMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_HIGH_MEMORY_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCounters;

    fn snap(usage: f64) -> MemorySnapshot {
        let used = (usage * 1000.0).round() as u64;
        MemorySnapshot::from_counters(MemoryCounters::new(used, 1000, 1000), "test").unwrap()
    }

    #[test]
    fn crossing_threshold_transitions_once() {
        let mut monitor = PressureMonitor::new(0.7);
        assert_eq!(monitor.observe(Some(&snap(0.5))), None);

        let t = monitor.observe(Some(&snap(0.85))).unwrap();
        assert_eq!(t.from, PressureState::Normal);
        assert_eq!(t.to, PressureState::HighUsage);
        assert!(t.entered_high_usage());

        // Staying high is not another transition.
        assert_eq!(monitor.observe(Some(&snap(0.9))), None);
        assert_eq!(monitor.transitions(), 1);
        assert_eq!(monitor.state(), PressureState::HighUsage);
    }

    #[test]
    fn at_threshold_returns_to_normal() {
        let mut monitor = PressureMonitor::new(0.7);
        monitor.observe(Some(&snap(0.8)));
        let t = monitor.observe(Some(&snap(0.7))).unwrap();
        assert_eq!(t.to, PressureState::Normal);
        assert!(!t.entered_high_usage());
    }

    #[test]
    fn missing_snapshot_keeps_state() {
        let mut monitor = PressureMonitor::default();
        for _ in 0..5 {
            assert_eq!(monitor.observe(None), None);
        }
        assert_eq!(monitor.state(), PressureState::Normal);
        assert_eq!(monitor.threshold(), DEFAULT_HIGH_MEMORY_THRESHOLD);
    }
}
