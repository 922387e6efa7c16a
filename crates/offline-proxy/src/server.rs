//! HTTP server fronting the upstream application
//!
//! Every request except `/__offline/health` becomes a fetch event for the
//! worker. Requests the worker declines are relayed to the upstream as-is.

use crate::error::{ProxyError, Result};
use crate::proxy::is_hop_by_hop;
use crate::types::HealthResponse;
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use offline_worker::{
    FetchDecision, FetchRequest, FetchResponse, Network, OfflineWorker, ResponseSource,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};
use url::Url;

/// Largest request body relayed upstream
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared state for the HTTP server
pub struct ServerState {
    pub worker: OfflineWorker,
    /// Used for requests the worker passes through
    pub network: Arc<dyn Network>,
    pub upstream: Url,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(worker: OfflineWorker, network: Arc<dyn Network>, upstream: Url) -> Self {
        Self {
            worker,
            network,
            upstream,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/__offline/health", get(health))
        .fallback(intercept)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Result<Json<HealthResponse>> {
    let worker = state.worker.stats().await?;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        upstream: state.upstream.to_string(),
        worker,
    }))
}

/// Hand the request to the worker, relaying upstream on pass-through
async fn intercept(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let request = build_request(
        &state.upstream,
        &state.worker.config().cdn_host_marker,
        &method,
        &uri,
        &headers,
        body,
    )?;

    match state.worker.handle_fetch(&request).await? {
        FetchDecision::Respond(served) => {
            let tag = match served.source {
                ResponseSource::Cache => "HIT",
                ResponseSource::Network => "MISS",
                ResponseSource::OfflineFallback => "OFFLINE",
            };
            Ok(relay_response(served.response, tag))
        }
        FetchDecision::PassThrough => {
            debug!(method = %request.method, url = %request.url, "Passing through");
            let response = state
                .network
                .fetch(&request)
                .await
                .map_err(ProxyError::from)?;
            Ok(relay_response(response, "BYPASS"))
        }
    }
}

/// Turn an incoming request into a fetch event request.
///
/// Origin-form URIs resolve against the upstream. Absolute-form URIs (a
/// client using this as a forward proxy, e.g. for CDN images) are kept, but
/// only when they point at the upstream origin or a CDN host; anything else
/// is refused so the proxy never reaches arbitrary hosts.
pub fn build_request(
    upstream: &Url,
    cdn_host_marker: &str,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<FetchRequest> {
    let url = if uri.scheme().is_some() {
        Url::parse(&uri.to_string())
    } else {
        let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        upstream.join(path)
    }
    .map_err(|e| ProxyError::Worker(e.into()))?;

    if !is_allowed_target(upstream, cdn_host_marker, &url) {
        warn!(method = %method, url = %url, "Refusing request for foreign host");
        return Err(ProxyError::BadRequest(format!(
            "host not served by this proxy: {}",
            url.host_str().unwrap_or("")
        )));
    }

    let mut request = FetchRequest::new(method.as_str(), url).with_body(body);
    for (name, value) in headers {
        if *name == header::HOST || is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    Ok(request)
}

fn is_allowed_target(upstream: &Url, cdn_host_marker: &str, url: &Url) -> bool {
    if url.origin() == upstream.origin() {
        return true;
    }
    let web = matches!(url.scheme(), "http" | "https");
    let cdn = url
        .host_str()
        .is_some_and(|host| !cdn_host_marker.is_empty() && host.contains(cdn_host_marker));
    web && cdn
}

fn relay_response(response: FetchResponse, cache_tag: &'static str) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut relayed = Response::new(Body::from(response.body));
    *relayed.status_mut() = status;

    let headers = relayed.headers_mut();
    for (name, value) in &response.headers {
        if is_hop_by_hop(name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers.insert("x-cache", HeaderValue::from_static(cache_tag));

    relayed.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::Request;
    use offline_worker::{MemoryCacheStorage, WorkerConfig, WorkerError};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tower::ServiceExt;

    const UPSTREAM: &str = "http://localhost:4000";
    const CDN_MARKER: &str = offline_worker::constants::CDN_HOST_MARKER;

    /// Upstream double with canned responses that records what it saw
    #[derive(Default)]
    struct StubUpstream {
        responses: Mutex<HashMap<String, FetchResponse>>,
        seen: Mutex<Vec<FetchRequest>>,
        offline: Mutex<bool>,
    }

    impl StubUpstream {
        fn with_app() -> Self {
            let stub = Self::default();
            for path in offline_worker::constants::PRECACHE_ASSETS {
                stub.respond(path, FetchResponse::new(200, format!("precached {}", path)));
            }
            stub
        }

        fn respond(&self, path: &str, response: FetchResponse) {
            let url = Url::parse(UPSTREAM).unwrap().join(path).unwrap().to_string();
            self.responses.lock().unwrap().insert(url, response);
        }

        fn set_offline(&self, offline: bool) {
            *self.offline.lock().unwrap() = offline;
        }

        fn seen(&self) -> Vec<FetchRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Network for StubUpstream {
        async fn fetch(&self, request: &FetchRequest) -> offline_worker::Result<FetchResponse> {
            self.seen.lock().unwrap().push(request.clone());
            if *self.offline.lock().unwrap() {
                return Err(WorkerError::Network("connection refused".to_string()));
            }
            Ok(self
                .responses
                .lock()
                .unwrap()
                .get(request.url.as_str())
                .cloned()
                .unwrap_or_else(|| FetchResponse::new(404, "not found")))
        }
    }

    fn create_test_state(upstream: Arc<StubUpstream>) -> SharedState {
        let url = Url::parse(UPSTREAM).unwrap();
        let worker = OfflineWorker::new(
            WorkerConfig::new(url.clone()),
            Arc::new(MemoryCacheStorage::new()),
            upstream.clone(),
        );
        Arc::new(ServerState::new(worker, upstream, url))
    }

    async fn activated_state(upstream: Arc<StubUpstream>) -> SharedState {
        let state = create_test_state(upstream);
        state.worker.install().await.unwrap();
        state.worker.activate().await.unwrap();
        state
    }

    async fn send(state: SharedState, request: Request<Body>) -> (StatusCode, String, Vec<u8>) {
        let response = create_router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let tag = response
            .headers()
            .get("x-cache")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, tag, body.to_vec())
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = activated_state(Arc::new(StubUpstream::with_app())).await;

        let (status, _, body) = send(state, get_request("/__offline/health")).await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_secs"].as_u64().is_some());
        assert_eq!(json["worker"]["state"], "activated");
        assert_eq!(json["worker"]["cache_name"], "react-gym-v1");
        assert_eq!(json["worker"]["entries"], 7);
    }

    #[tokio::test]
    async fn test_precached_asset_is_a_hit() {
        let upstream = Arc::new(StubUpstream::with_app());
        let state = activated_state(upstream.clone()).await;
        let fetches_before = upstream.seen().len();

        let (status, tag, body) = send(state, get_request("/assets/app.css")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(tag, "HIT");
        assert_eq!(body, b"precached /assets/app.css");
        assert_eq!(upstream.seen().len(), fetches_before);
    }

    #[tokio::test]
    async fn test_page_online_is_a_miss_and_gets_cached() {
        let upstream = Arc::new(StubUpstream::with_app());
        upstream.respond(
            "/dashboard",
            FetchResponse::new(200, "<h1>dashboard</h1>").with_header("content-type", "text/html"),
        );
        let state = activated_state(upstream.clone()).await;

        let response = create_router(state.clone())
            .oneshot(get_request("/dashboard"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-cache"], "MISS");
        assert_eq!(response.headers()["content-type"], "text/html");

        state.worker.settle().await;
        upstream.set_offline(true);

        let (status, tag, body) = send(state, get_request("/dashboard")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tag, "HIT");
        assert_eq!(body, b"<h1>dashboard</h1>");
    }

    #[tokio::test]
    async fn test_page_offline_without_copy_serves_offline_page() {
        let upstream = Arc::new(StubUpstream::with_app());
        let state = activated_state(upstream.clone()).await;
        upstream.set_offline(true);

        let (status, tag, body) = send(state, get_request("/dashboard")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(tag, "OFFLINE");
        assert_eq!(body, b"precached /offline");
    }

    #[tokio::test]
    async fn test_post_is_relayed_untouched() {
        let upstream = Arc::new(StubUpstream::with_app());
        upstream.respond("/api/data", FetchResponse::new(201, "created"));
        let state = activated_state(upstream.clone()).await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/data")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"reps":10}"#))
            .unwrap();
        let (status, tag, body) = send(state.clone(), request).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(tag, "BYPASS");
        assert_eq!(body, b"created");

        let seen = upstream.seen();
        let last = seen.last().unwrap();
        assert_eq!(last.method, "POST");
        assert_eq!(&last.body[..], br#"{"reps":10}"#);

        state.worker.settle().await;
        assert_eq!(state.worker.stats().await.unwrap().entries, 7);
    }

    #[tokio::test]
    async fn test_static_asset_offline_miss_is_bad_gateway() {
        let upstream = Arc::new(StubUpstream::with_app());
        let state = activated_state(upstream.clone()).await;
        upstream.set_offline(true);

        let (status, _, body) = send(state, get_request("/assets/new-chunk.js")).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Upstream unreachable");
    }

    #[tokio::test]
    async fn test_unactivated_worker_bypasses() {
        let upstream = Arc::new(StubUpstream::with_app());
        let state = create_test_state(upstream);

        let (status, tag, body) = send(state, get_request("/assets/app.css")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(tag, "BYPASS");
        assert_eq!(body, b"precached /assets/app.css");
    }

    #[tokio::test]
    async fn test_disk_backed_worker() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = Arc::new(StubUpstream::with_app());
        let url = Url::parse(UPSTREAM).unwrap();
        let storage = offline_worker::DiskCacheStorage::new(dir.path().to_path_buf());
        storage.init().await.unwrap();

        let worker = OfflineWorker::new(
            WorkerConfig::new(url.clone()),
            Arc::new(storage),
            upstream.clone(),
        );
        worker.install().await.unwrap();
        worker.activate().await.unwrap();
        let state = Arc::new(ServerState::new(worker, upstream, url));

        let (status, tag, _) = send(state.clone(), get_request("/icon-192x192.png")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tag, "HIT");
        assert!(dir.path().join("react-gym-v1").is_dir());
    }

    #[test]
    fn test_build_request_resolves_against_upstream() {
        let upstream = Url::parse(UPSTREAM).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:3005"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

        let uri: Uri = "/workouts?page=2".parse().unwrap();
        let request = build_request(
            &upstream,
            CDN_MARKER,
            &Method::GET,
            &uri,
            &headers,
            Bytes::new(),
        )
        .unwrap();

        assert_eq!(request.url.as_str(), "http://localhost:4000/workouts?page=2");
        assert!(request.is_get());
        assert_eq!(
            request.headers,
            vec![("accept".to_string(), "text/html".to_string())]
        );
    }

    #[test]
    fn test_build_request_keeps_absolute_cdn_uri() {
        let upstream = Url::parse(UPSTREAM).unwrap();
        let uri: Uri = "https://media.telnyxcloudstorage.com/photo.jpg"
            .parse()
            .unwrap();

        let request = build_request(
            &upstream,
            CDN_MARKER,
            &Method::GET,
            &uri,
            &HeaderMap::new(),
            Bytes::new(),
        )
        .unwrap();

        assert_eq!(
            request.url.as_str(),
            "https://media.telnyxcloudstorage.com/photo.jpg"
        );
    }

    #[test]
    fn test_build_request_accepts_absolute_upstream_uri() {
        let upstream = Url::parse(UPSTREAM).unwrap();
        let uri: Uri = "http://localhost:4000/dashboard".parse().unwrap();

        let request = build_request(
            &upstream,
            CDN_MARKER,
            &Method::GET,
            &uri,
            &HeaderMap::new(),
            Bytes::new(),
        )
        .unwrap();

        assert_eq!(request.url.as_str(), "http://localhost:4000/dashboard");
    }

    #[test]
    fn test_build_request_rejects_foreign_hosts() {
        let upstream = Url::parse(UPSTREAM).unwrap();

        for target in [
            "http://169.254.169.254/latest/meta-data/iam",
            "http://internal.example/admin",
            "http://localhost:4001/dashboard",
            "ftp://media.telnyxcloudstorage.com/photo.jpg",
        ] {
            let uri: Uri = target.parse().unwrap();
            let result = build_request(
                &upstream,
                CDN_MARKER,
                &Method::GET,
                &uri,
                &HeaderMap::new(),
                Bytes::new(),
            );
            assert!(
                matches!(result, Err(ProxyError::BadRequest(_))),
                "{} was accepted",
                target
            );
        }
    }

    #[tokio::test]
    async fn test_foreign_host_is_refused_and_not_cached() {
        let upstream = Arc::new(StubUpstream::with_app());
        let state = activated_state(upstream.clone()).await;
        let fetches_before = upstream.seen().len();

        let (status, _, body) = send(
            state.clone(),
            get_request("http://169.254.169.254/latest/meta-data/iam"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("169.254.169.254"));

        let post = Request::builder()
            .method("POST")
            .uri("http://internal.example/admin")
            .body(Body::from("drop"))
            .unwrap();
        let (status, _, _) = send(state.clone(), post).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(upstream.seen().len(), fetches_before);
        state.worker.settle().await;
        assert_eq!(state.worker.stats().await.unwrap().entries, 7);
    }

    #[tokio::test]
    async fn test_cdn_image_through_proxy_is_cached() {
        let upstream = Arc::new(StubUpstream::with_app());
        upstream.respond(
            "https://media.telnyxcloudstorage.com/photo.jpg",
            FetchResponse::new(200, "jpeg bytes"),
        );
        let state = activated_state(upstream.clone()).await;

        let (status, tag, body) = send(
            state.clone(),
            get_request("https://media.telnyxcloudstorage.com/photo.jpg"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tag, "MISS");
        assert_eq!(body, b"jpeg bytes");

        state.worker.settle().await;
        upstream.set_offline(true);

        let (status, tag, _) = send(
            state,
            get_request("https://media.telnyxcloudstorage.com/photo.jpg"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tag, "HIT");
    }

    #[tokio::test]
    async fn test_cached_page_is_replayed_without_cookies() {
        let upstream = Arc::new(StubUpstream::with_app());
        upstream.respond(
            "/dashboard",
            FetchResponse::new(200, "<h1>alice</h1>")
                .with_header("content-type", "text/html")
                .with_header("set-cookie", "session=alice"),
        );
        let state = activated_state(upstream.clone()).await;

        let response = create_router(state.clone())
            .oneshot(get_request("/dashboard"))
            .await
            .unwrap();
        assert_eq!(response.headers()["x-cache"], "MISS");
        assert_eq!(response.headers()["set-cookie"], "session=alice");

        state.worker.settle().await;
        upstream.set_offline(true);

        let response = create_router(state)
            .oneshot(get_request("/dashboard"))
            .await
            .unwrap();
        assert_eq!(response.headers()["x-cache"], "HIT");
        assert_eq!(response.headers()["content-type"], "text/html");
        assert!(response.headers().get("set-cookie").is_none());
    }

    #[test]
    fn test_relay_response_sets_cache_tag_and_drops_hop_headers() {
        let response = FetchResponse::new(200, "ok")
            .with_header("content-type", "text/plain")
            .with_header("transfer-encoding", "chunked");

        let relayed = relay_response(response, "HIT");

        assert_eq!(relayed.status(), StatusCode::OK);
        assert_eq!(relayed.headers()["x-cache"], "HIT");
        assert_eq!(relayed.headers()["content-type"], "text/plain");
        assert!(relayed.headers().get("transfer-encoding").is_none());
    }
}
