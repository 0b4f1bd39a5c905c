//! Optional read-only status endpoint (`--status-addr`), additive to the
//! synchronous core.
//!
//! Runs on its own OS thread with a single-threaded Tokio runtime so the
//! core never has to become async.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::answers::AnswerValue;

/// A read-only JSON snapshot of the Answer Store.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub(crate) struct StatusSnapshot {
    pub(crate) command: String,
    pub(crate) groups: Vec<(String, BTreeMap<String, AnswerValue>)>,
}

type Shared = Arc<RwLock<StatusSnapshot>>;

/// Handle held by the orchestrator driver to publish updated snapshots.
#[derive(Clone)]
pub(crate) struct StatusHandle {
    shared: Shared,
}

impl StatusHandle {
    pub(crate) fn update(&self, snapshot: StatusSnapshot) {
        if let Ok(mut guard) = self.shared.write() {
            *guard = snapshot;
        }
    }
}

/// Starts the status server in the background and returns immediately. The
/// server thread runs for the lifetime of the process; there is no
/// graceful-shutdown path because the endpoint carries no mutating state to
/// flush.
pub(crate) fn spawn(addr: SocketAddr) -> StatusHandle {
    let shared: Shared = Arc::new(RwLock::new(StatusSnapshot::default()));
    let handle = StatusHandle { shared: shared.clone() };

    std::thread::Builder::new()
        .name("atomicapp-status".to_owned())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_io().enable_time().build() {
                Ok(rt) => rt,
                Err(err) => {
                    error!(%err, "failed to start status endpoint runtime");
                    return;
                }
            };

            runtime.block_on(async move {
                let app = Router::new()
                    .route("/status", get(status_handler))
                    .with_state(shared)
                    .layer(TraceLayer::new_for_http());

                info!(%addr, "status endpoint listening");
                let listener = match tokio::net::TcpListener::bind(addr).await {
                    Ok(listener) => listener,
                    Err(err) => {
                        error!(%err, %addr, "status endpoint failed to bind");
                        return;
                    }
                };

                if let Err(err) = axum::serve(listener, app).await {
                    error!(%err, "status endpoint terminated");
                }
            });
        })
        .expect("failed to spawn status endpoint thread");

    handle
}

async fn status_handler(State(shared): State<Shared>) -> Json<StatusSnapshot> {
    let snapshot = shared.read().map(|g| g.clone()).unwrap_or_default();
    Json(snapshot)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    use super::*;

    fn router(shared: Shared) -> Router {
        Router::new()
            .route("/status", get(status_handler))
            .with_state(shared)
            .layer(TraceLayer::new_for_http())
    }

    #[tokio::test]
    async fn reports_last_published_snapshot() {
        let shared: Shared = Arc::new(RwLock::new(StatusSnapshot::default()));
        let handle = StatusHandle { shared: shared.clone() };
        handle.update(StatusSnapshot {
            command: "run".to_owned(),
            groups: vec![("general".to_owned(), BTreeMap::new())],
        });

        let response = router(shared)
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let snapshot: StatusSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(snapshot.command, "run");
        assert_eq!(snapshot.groups.len(), 1);
    }

    #[tokio::test]
    async fn defaults_to_empty_snapshot_before_any_update() {
        let shared: Shared = Arc::new(RwLock::new(StatusSnapshot::default()));

        let response = router(shared)
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let snapshot: StatusSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(snapshot.command, "");
        assert!(snapshot.groups.is_empty());
    }
}
