//! Convenience re-exports for common `reclaim-rs` types.
//!
//! ```ignore
//! use reclaim_rs::prelude::*;
//! ```
//!
//! Probe internals (`ProcProbe` paths, the sampler) and the log capture
//! layer are left out; import those from their modules when needed.

// ── Registry ────────────────────────────────────────────────────────
pub use crate::registry::{
    Registry, RegistryStats, ResourceHandle, ResourceInfo, idle_for, matches_type, of_type,
    resource_id, untouched,
};

// ── Memory ──────────────────────────────────────────────────────────
pub use crate::memory::{
    MemoryCounters, MemoryProbe, MemorySnapshot, NoProbe, PressureState, default_probe,
};

// ── Collector ───────────────────────────────────────────────────────
pub use crate::collector::{
    CollectTrigger, Collector, CollectorConfig, CollectorEvent, CollectorTask,
    CompositeEventHandler, Evaluation, EvaluationTrigger, EventHandler, FnEventHandler,
    LoggingHandler, NoopHandler, Visibility, VisibilitySignal,
};
