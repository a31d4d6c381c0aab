use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::collector::Metric;
use crate::config::{self, Config};
use crate::introspection;
use crate::manifest::MetricRequest;

/// Shared state of the HTTP handlers.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub catalog: Arc<Catalog>,
    /// Subscriptions forwarded to the manifest updater.
    pub updates: mpsc::Sender<Vec<MetricRequest>>,
    /// Most recently emitted batch.
    pub latest: watch::Receiver<Arc<Vec<Metric>>>,
}

async fn describe_catalog(
    State(state): State<ApiState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let config = Config::from(params);
    let descriptors = introspection::describe_all(&state.catalog, &config);
    (StatusCode::OK, Json(descriptors)).into_response()
}

async fn config_policy() -> Response {
    (StatusCode::OK, Json(config::config_policy())).into_response()
}

async fn subscribe(
    State(state): State<ApiState>,
    Json(requests): Json<Vec<MetricRequest>>,
) -> Response {
    log::debug!("Received subscription of {} metrics", requests.len());
    match state.updates.send(requests).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(_) => {
            log::error!("Failed to forward subscription: manifest updater is gone");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "collector is not accepting subscriptions",
            )
                .into_response()
        }
    }
}

async fn latest_metrics(State(state): State<ApiState>) -> Response {
    let batch = Arc::clone(&state.latest.borrow());
    (StatusCode::OK, Json(Vec::clone(&batch))).into_response()
}

pub fn router(state: ApiState) -> axum::Router {
    axum::Router::new()
        .route("/v1/catalog", get(describe_catalog))
        .route("/v1/config-policy", get(config_policy))
        .route("/v1/subscription", put(subscribe))
        .route("/v1/metrics", get(latest_metrics))
        .with_state(state)
}

pub struct APIServer {
    router: axum::Router,
}

impl APIServer {
    pub fn new(state: ApiState) -> Self {
        Self {
            router: router(state),
        }
    }

    /// Serves requests on `listener` until `cancel` fires.
    pub async fn listen(
        self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> std::io::Result<()> {
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::UNIX_EPOCH;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::catalog::{Family, Identity, MetricValue};

    struct Harness {
        state: ApiState,
        updates: mpsc::Receiver<Vec<MetricRequest>>,
        latest: watch::Sender<Arc<Vec<Metric>>>,
    }

    fn harness() -> Harness {
        let (updates_tx, updates) = mpsc::channel(1);
        let (latest, latest_rx) = watch::channel(Arc::new(Vec::new()));
        Harness {
            state: ApiState {
                catalog: Arc::new(Catalog::new()),
                updates: updates_tx,
                latest: latest_rx,
            },
            updates,
            latest,
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_describe_catalog_echoes_query() {
        let h = harness();
        let response = router(h.state)
            .oneshot(
                Request::get("/v1/catalog?interval=20")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let descriptors = json.as_array().unwrap();
        assert_eq!(descriptors.len(), 59);
        assert_eq!(descriptors[0]["config"]["interval"], "20");
        assert_eq!(descriptors[0]["namespace"][3]["value"], "*");
    }

    #[tokio::test]
    async fn test_config_policy() {
        let h = harness();
        let response = router(h.state)
            .oneshot(
                Request::get("/v1/config-policy")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["namespace"], serde_json::json!(["creo", "collector"]));
        assert_eq!(json["int_rules"][0]["key"], "interval");
        assert_eq!(json["int_rules"][0]["minimum"], 1);
    }

    #[tokio::test]
    async fn test_subscribe_forwards_requests() {
        let mut h = harness();
        let body = r#"[{"namespace": ["creo", "collector", "container", "*", "*", "*", "mem", "rss"], "config": {"interval": 5}}]"#;
        let response = router(h.state)
            .oneshot(
                Request::put("/v1/subscription")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let requests = h.updates.recv().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].namespace[7], "rss");
    }

    #[tokio::test]
    async fn test_subscribe_without_updater() {
        let h = harness();
        drop(h.updates);
        let response = router(h.state)
            .oneshot(
                Request::put("/v1/subscription")
                    .header("content-type", "application/json")
                    .body(Body::from("[]"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_latest_metrics() {
        let h = harness();
        let catalog = Catalog::new();
        let def = catalog.lookup(Family::Memory, "rss").unwrap();
        let identity = Identity {
            namespace: "default".to_owned(),
            pod_name: "web-1".to_owned(),
            container_name: "app".to_owned(),
        };
        h.latest
            .send(Arc::new(vec![Metric {
                namespace: def.namespace(&identity, None),
                unit: def.unit,
                description: def.description,
                value: MetricValue::Unsigned(42),
                timestamp: UNIX_EPOCH,
            }]))
            .unwrap();

        let response = router(h.state)
            .oneshot(Request::get("/v1/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json[0]["value"], 42);
        assert_eq!(json[0]["namespace"][6]["value"], "mem");
    }
}
