//! Browser dashboard for `reclaim-rs` collectors.
//!
//! `reclaim-web` provides an axum web server that exposes a WebSocket
//! endpoint streaming collector events and a REST API for inspection and
//! control. Any WebSocket client works; no frontend is bundled.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use reclaim_rs::prelude::*;
//! use reclaim_web::{WebBroadcastHandler, WebConfig, spawn_web};
//!
//! let config = WebConfig::default();
//! let (ws_tx, _) = config.broadcast_channel();
//! let collector = Arc::new(
//!     Collector::new(CollectorConfig::default(), default_probe())
//!         .with_event_handler(WebBroadcastHandler::new(ws_tx.clone())),
//! );
//! let visibility = VisibilitySignal::default();
//! let task = collector.start(Some(&visibility));
//!
//! let addr = spawn_web(collector, visibility, None, ws_tx, config).await?;
//! println!("Dashboard API: http://{addr}/api/state");
//! ```
//!
//! # Architecture
//!
//! ```text
//! Collector ──CollectorEvent──▶ WebBroadcastHandler ──WsMessage──▶ WebSocket clients
//!     ▲                                                                  │
//!     └──── /api/collect, /api/resources/{id}/touch, /api/visibility ◀──┘
//! ```
//!
//! | Endpoint | Effect |
//! |----------|--------|
//! | `GET /api/state` | Full [`CollectorSnapshot`] |
//! | `GET /api/resources` | Registered entries |
//! | `POST /api/collect` | Manual sweep; body `{"type": ..}` or `{"idle_secs": ..}` narrows it |
//! | `POST /api/resources/{id}/touch` | Touch; 404 if not registered |
//! | `POST /api/visibility` | `{"visible": bool}` |
//! | `POST /api/evaluate` | One pressure evaluation now |
//! | `GET /ws` | Snapshot, then a stream of [`WsMessage`] |

mod api;
pub mod broadcast;
mod server;
pub mod snapshot;
mod ws;

pub use broadcast::{WebBroadcastHandler, WsMessage};
pub use snapshot::CollectorSnapshot;

use std::net::SocketAddr;
use std::sync::Arc;

use reclaim_rs::collector::{Collector, VisibilitySignal};
use reclaim_rs::logging::LogBuffer;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
    /// WebSocket broadcast channel capacity. Default: 256.
    ///
    /// Clients that fall behind by this many messages receive a fresh
    /// state snapshot to resynchronize.
    pub broadcast_capacity: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            broadcast_capacity: 256,
        }
    }
}

impl WebConfig {
    /// A broadcast channel sized by [`broadcast_capacity`](Self::broadcast_capacity).
    pub fn broadcast_channel(
        &self,
    ) -> (
        tokio::sync::broadcast::Sender<WsMessage>,
        tokio::sync::broadcast::Receiver<WsMessage>,
    ) {
        tokio::sync::broadcast::channel(self.broadcast_capacity)
    }
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// The server runs until the Tokio runtime shuts down.
///
/// # Arguments
///
/// * `collector`: The collector to expose.
/// * `visibility`: Signal that `POST /api/visibility` publishes to. Pass the
///   same signal to [`Collector::start`].
/// * `logs`: Captured log lines to include in snapshots, if any.
/// * `broadcast_tx`: Sender half of the WebSocket broadcast channel. Pass the
///   same sender to [`WebBroadcastHandler::new()`].
/// * `config`: Server configuration.
pub async fn spawn_web(
    collector: Arc<Collector>,
    visibility: VisibilitySignal,
    logs: Option<LogBuffer>,
    broadcast_tx: tokio::sync::broadcast::Sender<WsMessage>,
    config: WebConfig,
) -> Result<SocketAddr, String> {
    let state = api::AppState {
        collector,
        visibility,
        logs,
        broadcast_tx,
    };
    server::start_server(server::build_router(state), config.bind_addr).await
}
