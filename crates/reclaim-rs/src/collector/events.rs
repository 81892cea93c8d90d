//! Events emitted by a [`Collector`](super::Collector), and handlers for them.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests, or when nobody is listening |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |
//! | Custom `impl EventHandler` | Metrics, UI updates, broadcasting |

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::scheduler::Visibility;
use crate::memory::{MemorySnapshot, PressureState, Transition};

/// Why a sweep ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectTrigger {
    /// An explicit request through the API.
    Manual,
    /// Memory usage crossed the threshold.
    HighMemory,
    /// The forced-collection interval elapsed.
    Interval,
}

/// Why the pressure heuristic was evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationTrigger {
    /// First evaluation after the task started.
    Startup,
    /// Periodic monitor tick.
    Interval,
    /// The visibility signal turned visible.
    Visibility,
    /// Follow-up after an automatic collection.
    Recheck,
    /// An explicit request through the API.
    Manual,
}

#[derive(Debug)]
pub enum CollectorEvent<'a> {
    /// The background task started.
    Started {
        monitor_interval: Duration,
        auto_collect_interval: Option<Duration>,
    },
    /// The background task stopped.
    Stopped,
    /// The pressure heuristic was evaluated. `snapshot` is `None` when the
    /// probe exposes no counters.
    Evaluated {
        trigger: EvaluationTrigger,
        snapshot: Option<&'a MemorySnapshot>,
        state: PressureState,
    },
    /// The pressure state changed.
    PressureChanged {
        transition: &'a Transition,
        threshold: f64,
    },
    /// A sweep evicted entries. Emitted even when `ids` is empty.
    Collected {
        trigger: CollectTrigger,
        ids: &'a [String],
    },
    /// A cleanup callback panicked. The entry was still evicted.
    CleanupFailed { id: &'a str, message: &'a str },
    /// The visibility signal changed.
    VisibilityChanged(Visibility),
}

/// Observer of collector events.
///
/// Handlers run on whichever task produced the event (usually the collector
/// task), outside any registry lock. Keep them quick.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &CollectorEvent<'_>) {
        let _ = event;
    }
}

/// A handler that ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let CollectorEvent::Collected { ids, .. } = event {
///         println!("evicted {}", ids.len());
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&CollectorEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&CollectorEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&CollectorEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &CollectorEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches every event to each inner handler, in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(metrics_enabled, MetricsHandler::new());
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Add a handler to the chain.
    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Conditionally add a handler to the chain.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    /// Add a handler from an `Option`. `None` is a no-op.
    pub fn with_opt(self, handler: Option<impl EventHandler + 'static>) -> Self {
        match handler {
            Some(h) => self.with(h),
            None => self,
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &CollectorEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// An event handler that logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &CollectorEvent<'_>) {
        match event {
            CollectorEvent::Started {
                monitor_interval,
                auto_collect_interval,
            } => {
                info!(
                    "Collector started (monitor every {monitor_interval:?}, forced collection {})",
                    match auto_collect_interval {
                        Some(i) => format!("every {i:?}"),
                        None => "off".to_string(),
                    }
                );
            }
            CollectorEvent::Stopped => {
                info!("Collector stopped");
            }
            CollectorEvent::Evaluated {
                trigger,
                snapshot,
                state,
            } => match snapshot {
                Some(s) => debug!("[{trigger:?}] {} -> {state:?}", s.to_log_string()),
                None => trace!("[{trigger:?}] memory counters unavailable"),
            },
            CollectorEvent::PressureChanged {
                transition,
                threshold,
            } => {
                info!(
                    "Memory pressure {:?} -> {:?} (usage {:.1}%, threshold {:.1}%)",
                    transition.from,
                    transition.to,
                    transition.usage * 100.0,
                    threshold * 100.0,
                );
            }
            CollectorEvent::Collected { trigger, ids } => {
                if ids.is_empty() {
                    debug!("Sweep ({trigger:?}) found nothing to collect");
                } else {
                    info!("Collected {} resource(s) ({trigger:?})", ids.len());
                }
            }
            CollectorEvent::CleanupFailed { id, message } => {
                warn!("Cleanup for {id} failed: {message}");
            }
            CollectorEvent::VisibilityChanged(visibility) => {
                debug!("Visibility changed: {visibility:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn composite_dispatches_to_all() {
        let count = Arc::new(AtomicUsize::new(0));
        let (a, b) = (count.clone(), count.clone());
        let handler = CompositeEventHandler::new()
            .with(FnEventHandler::new(move |_| {
                a.fetch_add(1, Ordering::SeqCst);
            }))
            .with(NoopHandler)
            .with_if(false, LoggingHandler)
            .with_opt(Some(FnEventHandler::new(move |_| {
                b.fetch_add(1, Ordering::SeqCst);
            })));

        assert_eq!(handler.len(), 3);
        handler.on_event(&CollectorEvent::Stopped);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn logging_handler_accepts_every_variant() {
        let transition = Transition {
            from: PressureState::Normal,
            to: PressureState::HighUsage,
            usage: 0.9,
        };
        let ids = vec!["image-1".to_string()];
        let events = [
            CollectorEvent::Started {
                monitor_interval: Duration::from_secs(5),
                auto_collect_interval: None,
            },
            CollectorEvent::Evaluated {
                trigger: EvaluationTrigger::Interval,
                snapshot: None,
                state: PressureState::Normal,
            },
            CollectorEvent::PressureChanged {
                transition: &transition,
                threshold: 0.7,
            },
            CollectorEvent::Collected {
                trigger: CollectTrigger::HighMemory,
                ids: &ids,
            },
            CollectorEvent::CleanupFailed {
                id: "image-1",
                message: "boom",
            },
            CollectorEvent::VisibilityChanged(Visibility::Hidden),
            CollectorEvent::Stopped,
        ];
        for event in &events {
            LoggingHandler.on_event(event);
        }
    }
}
