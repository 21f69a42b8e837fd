//! HTTP endpoints exposing the node's statistics.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use switchyard_negotiation::{MasterJobState, NegotiationRunner, NegotiationStatistics};
use switchyard_scheduler::{Scheduler, SchedulerStatistics};

/// Shared state behind the HTTP handlers.
#[derive(Clone)]
pub struct NodeState {
    pub service_id: String,
    pub started_at: DateTime<Utc>,
    pub scheduler: Arc<Scheduler>,
    /// `None` when negotiation is disabled for this node.
    pub negotiation: Option<Arc<NegotiationRunner>>,
}

/// `GET /stats` response.
#[derive(Debug, Serialize)]
pub struct NodeStatistics {
    pub service_id: String,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub scheduler: SchedulerStatistics,
    pub negotiation: Option<NegotiationStatistics>,
}

/// `GET /health` response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service_id: String,
    pub state: Option<MasterJobState>,
    pub is_master: bool,
}

impl NodeState {
    pub fn statistics(&self) -> NodeStatistics {
        let now = Utc::now();
        NodeStatistics {
            service_id: self.service_id.clone(),
            started_at: self.started_at,
            uptime_secs: (now - self.started_at).num_seconds(),
            scheduler: self.scheduler.statistics(),
            negotiation: self.negotiation.as_ref().map(|n| n.statistics()),
        }
    }

    pub fn health(&self) -> HealthResponse {
        let state = self.negotiation.as_ref().map(|n| n.state());
        HealthResponse {
            status: "ok",
            service_id: self.service_id.clone(),
            state,
            is_master: state.is_some_and(|s| s.is_master()),
        }
    }
}

pub fn router(state: NodeState) -> Router {
    Router::new()
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Spawn the stats HTTP server on the given port.
///
/// Returns a `JoinHandle` that resolves when the server shuts down.
pub fn spawn_stats_server(
    port: u16,
    state: NodeState,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(state);

        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(port, error = %e, "failed to bind stats HTTP server");
                return;
            }
        };

        tracing::info!(port, "stats HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut rx = shutdown;
                while !*rx.borrow() {
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
            .ok();

        tracing::info!("stats HTTP server stopped");
    })
}

async fn stats_handler(State(state): State<NodeState>) -> Json<NodeStatistics> {
    Json(state.statistics())
}

async fn health_handler(State(state): State<NodeState>) -> Json<HealthResponse> {
    Json(state.health())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use switchyard_negotiation::{LocalBus, NegotiationConfig, Negotiator};
    use switchyard_scheduler::SchedulerConfig;

    use super::*;
    use crate::handler::LoggingHandler;

    fn state(with_negotiation: bool) -> NodeState {
        let scheduler = Arc::new(Scheduler::new(SchedulerConfig::default(), Arc::new(LoggingHandler)).unwrap());
        let negotiation = with_negotiation.then(|| {
            let endpoint = Arc::new(LocalBus::default().endpoint());
            Arc::new(NegotiationRunner::new(
                Negotiator::new("node-a", NegotiationConfig::default()),
                endpoint.clone(),
                endpoint,
            ))
        });
        NodeState {
            service_id: "node-a".into(),
            started_at: Utc::now(),
            scheduler,
            negotiation,
        }
    }

    async fn get_json(app: Router, uri: &str) -> serde_json::Value {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn stats_include_bulkhead_levels() {
        let json = get_json(router(state(true)), "/stats").await;
        assert_eq!(json["service_id"], "node-a");
        assert_eq!(json["scheduler"]["bulkhead"]["levels"].as_array().unwrap().len(), 2);
        assert_eq!(json["scheduler"]["bulkhead"]["available"], 12);
        assert_eq!(json["negotiation"]["state"], "inactive");
    }

    #[tokio::test]
    async fn health_without_negotiation() {
        let json = get_json(router(state(false)), "/health").await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["is_master"], false);
        assert!(json["state"].is_null());
    }
}
