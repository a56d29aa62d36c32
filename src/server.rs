//! HTTP front door
//!
//! Two routes: a static landing page and a per-cluster scrape path. A scrape
//! resolves the cluster from the current directory generation, refreshes its
//! credentials when they are stale, runs its collectors, and returns the
//! cluster's isolated registry in the Prometheus text format.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::{error, info, warn};

use crate::credentials::CredentialStore;
use crate::registry::RegistryService;
use crate::LISTEN_PORT;

/// Cluster credentials older than this are re-fetched before a scrape
pub const CREDENTIAL_MAX_AGE: Duration = Duration::from_secs(900);

const LANDING_PAGE: &str = "<html><head><title>Prism Gateway</title></head>\
<body><h1>Prism Gateway</h1>\
<p>Per-cluster metrics are served at <code>/metrics/{cluster}</code>.</p>\
</body></html>";

/// Shared state behind every HTTP handler
pub struct GatewayState {
    registry: Arc<RegistryService>,
    credentials: Arc<CredentialStore>,
    credential_max_age: Duration,
}

impl GatewayState {
    /// Create the handler state with the default credential max age
    pub fn new(registry: Arc<RegistryService>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            registry,
            credentials,
            credential_max_age: CREDENTIAL_MAX_AGE,
        }
    }

    /// Override the credential max age
    pub fn with_credential_max_age(mut self, max_age: Duration) -> Self {
        self.credential_max_age = max_age;
        self
    }
}

/// Build the front door router
pub fn gateway_routes(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/metrics/{name}", get(cluster_metrics))
        .with_state(state)
}

/// Bind the well-known port and serve until the process exits
pub async fn serve(state: Arc<GatewayState>) -> crate::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], LISTEN_PORT));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "metrics gateway listening");
    axum::serve(listener, gateway_routes(state)).await?;
    Ok(())
}

/// Handle `GET /` - static landing page
async fn index() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

/// Handle `GET /metrics/{name}` - scrape one cluster
async fn cluster_metrics(
    State(state): State<Arc<GatewayState>>,
    Path(name): Path<String>,
) -> Response {
    let Some(handle) = state.registry.lookup(&name) else {
        return (StatusCode::NOT_FOUND, "cluster not found\n").into_response();
    };

    // Stale credentials are refreshed in the request path; a failure here is
    // not fatal to the scrape, the previous credentials stay in use.
    if let Err(e) = handle
        .refresh_credentials_if_stale(&state.credentials, state.credential_max_age)
        .await
    {
        warn!(cluster = %name, error = %e, "credential refresh failed; scraping with previous credentials");
    }

    match handle.scrape().await {
        Ok(body) => (
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(cluster = %name, error = %e, "failed to produce metrics exposition");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics\n").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::PrismClient;
    use crate::credentials::{
        BasicCredentials, CredentialHandle, SectionCredentialSource, DEFAULT_SECTION,
    };
    use crate::registry::{ClusterDirectory, ClusterHandle};
    use axum::body::Body;
    use axum::http::Request;
    use prometheus::{Gauge, Registry};
    use std::collections::{BTreeMap, HashMap};
    use tower::ServiceExt;

    fn test_store() -> Arc<CredentialStore> {
        let sections = HashMap::from([(
            DEFAULT_SECTION.to_string(),
            BasicCredentials {
                username: "u".to_string(),
                password: "p".to_string(),
            },
        )]);
        Arc::new(CredentialStore::new(CredentialHandle::new(Arc::new(
            SectionCredentialSource::new(sections),
        ))))
    }

    fn handle_with_gauge(name: &str) -> Arc<ClusterHandle> {
        let client = Arc::new(
            PrismClient::new(
                "https://127.0.0.1:9440",
                BasicCredentials {
                    username: "u".to_string(),
                    password: "p".to_string(),
                },
            )
            .unwrap(),
        );
        let registry = Registry::new();
        let gauge = Gauge::new("nutanix_cluster_num_nodes", "Number of nodes").unwrap();
        gauge.set(4.0);
        registry.register(Box::new(gauge)).unwrap();
        Arc::new(ClusterHandle::from_parts(name, client, registry, Vec::new()))
    }

    fn test_router(names: &[&str]) -> Router {
        let clusters: BTreeMap<_, _> = names
            .iter()
            .map(|name| (name.to_string(), handle_with_gauge(name)))
            .collect();
        let service = Arc::new(RegistryService::new(ClusterDirectory::new(1, clusters)));
        let state = Arc::new(GatewayState::new(service, test_store()));
        gateway_routes(state)
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn landing_page_is_served_at_root() {
        let router = test_router(&[]);
        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("Prism Gateway"));
    }

    #[tokio::test]
    async fn known_cluster_serves_its_own_registry() {
        let router = test_router(&["prod-01"]);
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/metrics/prod-01")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("text/plain"));

        let body = body_text(response).await;
        assert!(body.contains("nutanix_cluster_num_nodes 4"));
    }

    #[tokio::test]
    async fn unknown_cluster_is_a_plain_not_found() {
        let router = test_router(&["prod-01"]);
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/metrics/prod-99")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_text(response).await;
        assert_eq!(body, "cluster not found\n");
    }

    #[tokio::test]
    async fn cluster_expositions_are_isolated() {
        let router = test_router(&["prod-01", "prod-02"]);

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/metrics/prod-01")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_text(response).await;

        // Each handle owns its registry: exactly one sample, not one per cluster.
        assert_eq!(
            body.matches("nutanix_cluster_num_nodes 4").count(),
            1,
            "expected a single sample in: {body}"
        );
    }

    #[tokio::test]
    async fn zero_max_age_refreshes_credentials_on_every_scrape() {
        let clusters: BTreeMap<_, _> = [("prod-01".to_string(), handle_with_gauge("prod-01"))]
            .into_iter()
            .collect();
        let service = Arc::new(RegistryService::new(ClusterDirectory::new(1, clusters)));
        let state = Arc::new(
            GatewayState::new(service, test_store()).with_credential_max_age(Duration::ZERO),
        );
        let router = gateway_routes(state);

        // Every scrape takes the refresh path; the store's default section
        // resolves, so the scrape still succeeds.
        for _ in 0..2 {
            let response = router
                .clone()
                .oneshot(
                    Request::builder()
                        .uri("/metrics/prod-01")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn credential_refresh_failure_does_not_fail_the_scrape() {
        let clusters: BTreeMap<_, _> = [("prod-01".to_string(), handle_with_gauge("prod-01"))]
            .into_iter()
            .collect();
        let service = Arc::new(RegistryService::new(ClusterDirectory::new(1, clusters)));

        // A store with no sections at all: every refresh attempt errors.
        let empty_store = Arc::new(CredentialStore::new(CredentialHandle::new(Arc::new(
            SectionCredentialSource::new(HashMap::new()),
        ))));
        let state = Arc::new(
            GatewayState::new(service, empty_store).with_credential_max_age(Duration::ZERO),
        );
        let router = gateway_routes(state);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/metrics/prod-01")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // The scrape proceeds with the credentials the handle already holds.
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("nutanix_cluster_num_nodes 4"));
    }

    #[tokio::test]
    async fn directory_swap_is_visible_to_following_requests() {
        let clusters: BTreeMap<_, _> = [("old-01".to_string(), handle_with_gauge("old-01"))]
            .into_iter()
            .collect();
        let service = Arc::new(RegistryService::new(ClusterDirectory::new(1, clusters)));
        let state = Arc::new(GatewayState::new(service.clone(), test_store()));
        let router = gateway_routes(state);

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/metrics/old-01")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let next: BTreeMap<_, _> = [("new-01".to_string(), handle_with_gauge("new-01"))]
            .into_iter()
            .collect();
        service.replace(ClusterDirectory::new(2, next));

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/metrics/old-01")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/metrics/new-01")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
