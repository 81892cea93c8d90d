//! REST API endpoint handlers.
//!
//! These complement the WebSocket channel for request/response use: the
//! initial state load, manual sweeps, touches, and visibility changes.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use reclaim_rs::collector::{Collector, Evaluation, EvaluationTrigger, Visibility, VisibilitySignal};
use reclaim_rs::logging::LogBuffer;
use reclaim_rs::registry::idle_for;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::broadcast::WsMessage;
use crate::snapshot::{CollectorSnapshot, ResourceSnapshot};

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<Collector>,
    pub visibility: VisibilitySignal,
    pub logs: Option<LogBuffer>,
    pub broadcast_tx: broadcast::Sender<WsMessage>,
}

impl AppState {
    pub fn snapshot(&self) -> CollectorSnapshot {
        CollectorSnapshot::capture(&self.collector, &self.visibility, self.logs.as_ref())
    }
}

/// GET /api/state: Full state snapshot.
pub async fn get_state(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(app.snapshot().to_json())
}

/// GET /api/resources: Registered entries, sorted by id.
pub async fn get_resources(State(app): State<AppState>) -> Json<Vec<ResourceSnapshot>> {
    let resources = app.collector.registry().resources();
    Json(resources.iter().map(ResourceSnapshot::from).collect())
}

/// Request body for POST /api/collect. Both fields are optional; without
/// either, every entry is evicted.
#[derive(Debug, Default, Deserialize)]
pub struct CollectRequest {
    /// Only evict entries of this type tag.
    #[serde(rename = "type")]
    pub type_tag: Option<String>,
    /// Only evict entries idle for at least this many seconds.
    pub idle_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct CollectResponse {
    pub collected: usize,
}

/// POST /api/collect: Manual sweep.
///
/// Returns 400 when both `type` and `idle_secs` are given.
pub async fn post_collect(
    State(app): State<AppState>,
    body: Option<Json<CollectRequest>>,
) -> Result<Json<CollectResponse>, (StatusCode, String)> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let collected = match (request.type_tag, request.idle_secs) {
        (Some(_), Some(_)) => {
            return Err((
                StatusCode::BAD_REQUEST,
                "specify at most one of `type` and `idle_secs`".into(),
            ));
        }
        (Some(tag), None) => app.collector.collect_by_type(&tag),
        (None, Some(secs)) => app
            .collector
            .collect_where(idle_for(Duration::from_secs(secs))),
        (None, None) => app.collector.collect(),
    };
    Ok(Json(CollectResponse { collected }))
}

/// POST /api/resources/{id}/touch: Keep a resource alive.
///
/// Returns 204 on success, 404 if the id is not registered.
pub async fn post_touch(State(app): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if app.collector.registry().touch(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Request body for POST /api/visibility.
#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub visible: bool,
}

#[derive(Debug, Serialize)]
pub struct VisibilityResponse {
    pub visibility: Visibility,
    /// `false` when the signal already had this value.
    pub changed: bool,
}

/// POST /api/visibility: Publish a visibility change.
pub async fn post_visibility(
    State(app): State<AppState>,
    Json(body): Json<VisibilityRequest>,
) -> Json<VisibilityResponse> {
    let visibility = if body.visible {
        Visibility::Visible
    } else {
        Visibility::Hidden
    };
    let changed = app.visibility.set(visibility);
    Json(VisibilityResponse {
        visibility,
        changed,
    })
}

/// POST /api/evaluate: Run one pressure evaluation now.
///
/// An evaluation that auto-collects schedules its own re-check.
pub async fn post_evaluate(State(app): State<AppState>) -> Json<Evaluation> {
    let evaluation = app.collector.evaluate(EvaluationTrigger::Manual);
    if evaluation.needs_recheck() {
        app.collector.schedule_recheck();
    }
    Json(evaluation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_request_deserializes() {
        let req: CollectRequest = serde_json::from_str(r#"{"type":"image"}"#).unwrap();
        assert_eq!(req.type_tag.as_deref(), Some("image"));
        assert_eq!(req.idle_secs, None);

        let req: CollectRequest = serde_json::from_str(r#"{"idle_secs":30}"#).unwrap();
        assert_eq!(req.idle_secs, Some(30));

        let req: CollectRequest = serde_json::from_str("{}").unwrap();
        assert!(req.type_tag.is_none() && req.idle_secs.is_none());
    }

    #[test]
    fn visibility_request_deserializes() {
        let req: VisibilityRequest = serde_json::from_str(r#"{"visible":false}"#).unwrap();
        assert!(!req.visible);
    }
}
