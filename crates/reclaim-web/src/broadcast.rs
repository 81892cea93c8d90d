//! [`EventHandler`] that converts collector events into WebSocket messages.
//!
//! [`WebBroadcastHandler`] turns each [`CollectorEvent`] into a
//! [`WsMessage`] and broadcasts it to all connected WebSocket clients via a
//! `tokio::sync::broadcast` channel.

use reclaim_rs::collector::{
    CollectTrigger, CollectorEvent, EvaluationTrigger, EventHandler, Visibility,
};
use reclaim_rs::memory::PressureState;
use serde::Serialize;
use tokio::sync::broadcast;

/// Most evicted ids listed in one [`WsMessage::Collected`]; the count is
/// always exact.
const MAX_WS_COLLECTED_IDS: usize = 100;

/// A message sent from the server to WebSocket clients.
///
/// Discriminated on the `type` field when serialized to JSON.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Full state snapshot (sent on connect and after a client lags).
    Snapshot { data: serde_json::Value },
    /// The background task started.
    Started {
        monitor_interval_ms: u64,
        auto_collect_interval_ms: Option<u64>,
    },
    /// The background task stopped.
    Stopped,
    /// A pressure evaluation ran. `usage` is `null` without counters.
    Evaluated {
        trigger: EvaluationTrigger,
        usage: Option<f64>,
        state: PressureState,
    },
    /// The pressure state changed.
    Pressure {
        from: PressureState,
        to: PressureState,
        usage: f64,
        threshold: f64,
    },
    /// A sweep finished.
    Collected {
        trigger: CollectTrigger,
        count: usize,
        ids: Vec<String>,
    },
    /// A cleanup callback failed.
    CleanupFailed { id: String, message: String },
    /// The visibility signal changed.
    Visibility { visibility: Visibility },
}

impl From<&CollectorEvent<'_>> for WsMessage {
    fn from(event: &CollectorEvent<'_>) -> Self {
        match event {
            CollectorEvent::Started {
                monitor_interval,
                auto_collect_interval,
            } => WsMessage::Started {
                monitor_interval_ms: monitor_interval.as_millis() as u64,
                auto_collect_interval_ms: auto_collect_interval.map(|d| d.as_millis() as u64),
            },
            CollectorEvent::Stopped => WsMessage::Stopped,
            CollectorEvent::Evaluated {
                trigger,
                snapshot,
                state,
            } => WsMessage::Evaluated {
                trigger: *trigger,
                usage: snapshot.map(|s| s.usage),
                state: *state,
            },
            CollectorEvent::PressureChanged {
                transition,
                threshold,
            } => WsMessage::Pressure {
                from: transition.from,
                to: transition.to,
                usage: transition.usage,
                threshold: *threshold,
            },
            CollectorEvent::Collected { trigger, ids } => WsMessage::Collected {
                trigger: *trigger,
                count: ids.len(),
                ids: ids.iter().take(MAX_WS_COLLECTED_IDS).cloned().collect(),
            },
            CollectorEvent::CleanupFailed { id, message } => WsMessage::CleanupFailed {
                id: id.to_string(),
                message: message.to_string(),
            },
            CollectorEvent::VisibilityChanged(visibility) => WsMessage::Visibility {
                visibility: *visibility,
            },
        }
    }
}

/// Event handler that broadcasts collector events to WebSocket clients.
///
/// Compose alongside [`LoggingHandler`](reclaim_rs::collector::LoggingHandler)
/// in a [`CompositeEventHandler`](reclaim_rs::collector::CompositeEventHandler):
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with(WebBroadcastHandler::new(ws_tx.clone()));
/// ```
pub struct WebBroadcastHandler {
    sender: broadcast::Sender<WsMessage>,
}

impl WebBroadcastHandler {
    pub fn new(sender: broadcast::Sender<WsMessage>) -> Self {
        Self { sender }
    }
}

impl EventHandler for WebBroadcastHandler {
    fn on_event(&self, event: &CollectorEvent<'_>) {
        // No subscribers is fine.
        let _ = self.sender.send(WsMessage::from(event));
    }
}
