//! CORS pass-through proxy for the attendance portal backend.
//!
//! The backend does not answer browser preflights, so the front end talks
//! to this service instead. Any method on any path is relayed to the
//! configured upstream with the query string appended; responses come back
//! with CORS headers attached.

pub mod config;
pub mod cors;
pub mod error;
pub mod proxy;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

pub use config::ProxyConfig;
pub use cors::CorsPolicy;
pub use error::ProxyError;

/// Profile photos travel base64-encoded inside JSON bodies
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub client: reqwest::Client,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config: Arc::new(config),
            client: reqwest::Client::new(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(proxy::forward)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(state.clone(), cors::cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::body::{to_bytes, Body};
    use axum::http::{HeaderMap, Method, Request, StatusCode, Uri};
    use axum::response::Redirect;
    use axum::response::IntoResponse;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    /// Upstream that echoes what it received as JSON
    async fn echo_upstream(hits: Arc<AtomicUsize>) -> SocketAddr {
        let app = Router::new().fallback(
            move |method: Method, uri: Uri, headers: HeaderMap, body: String| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    let accepts_gzip = headers
                        .get("accept-encoding")
                        .and_then(|v| v.to_str().ok())
                        .is_some_and(|v| v.contains("gzip"));
                    match uri.path() {
                        "/text" => {
                            return ([("content-type", "text/plain")], "plain").into_response()
                        }
                        "/missing" => {
                            return (
                                StatusCode::NOT_FOUND,
                                axum::Json(json!({"success": false, "error": "Not found"})),
                            )
                                .into_response()
                        }
                        "/moved" => return Redirect::to("/exec?moved=1").into_response(),
                        "/gzip" if accepts_gzip => {
                            let gzip_header: &'static [u8] = &[0x1f, 0x8b, 0x08, 0x00];
                            return (
                                [("content-type", "application/json"), ("content-encoding", "gzip")],
                                gzip_header,
                            )
                                .into_response();
                        }
                        _ => {}
                    }
                    axum::Json(json!({
                        "method": method.as_str(),
                        "query": uri.query(),
                        "body": body,
                        "contentType": headers.get("content-type").and_then(|v| v.to_str().ok()),
                        "auth": headers.get("authorization").and_then(|v| v.to_str().ok()),
                    }))
                    .into_response()
                }
            },
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn router_for(upstream: Option<String>, forward_headers: bool) -> Router {
        let config = ProxyConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            upstream_url: upstream.map(|u| reqwest::Url::parse(&u).unwrap()),
            cors: CorsPolicy::default(),
            forward_headers,
        };
        build_router(AppState::new(config))
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_preflight_short_circuits() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = echo_upstream(hits.clone()).await;
        let app = router_for(Some(format!("http://{}/exec", addr)), true);

        let response = app
            .oneshot(Request::options("/anything").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(response.headers()["access-control-max-age"], "86400");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_get_relays_query() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = echo_upstream(hits.clone()).await;
        let app = router_for(Some(format!("http://{}/exec?v=1", addr)), true);

        let response = app
            .oneshot(
                Request::get("/?action=getEvents&token=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-methods"],
            "GET, POST, OPTIONS"
        );
        let echoed = json_body(response).await;
        assert_eq!(echoed["method"], "GET");
        assert_eq!(echoed["query"], "v=1&action=getEvents&token=abc");
        assert_eq!(echoed["body"], "");
        assert_eq!(echoed["contentType"], "application/json");
    }

    #[tokio::test]
    async fn test_post_relays_body_and_headers() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = echo_upstream(hits.clone()).await;
        let payload = r#"{"action":"deleteEvent","eventId":"E1","token":"abc"}"#;

        let request = || {
            Request::post("/")
                .header("authorization", "Bearer abc")
                .body(Body::from(payload))
                .unwrap()
        };

        let app = router_for(Some(format!("http://{}/exec", addr)), true);
        let echoed = json_body(app.oneshot(request()).await.unwrap()).await;
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["body"], payload);
        assert_eq!(echoed["auth"], "Bearer abc");
        assert_eq!(echoed["contentType"], "application/json");

        let app = router_for(Some(format!("http://{}/exec", addr)), false);
        let echoed = json_body(app.oneshot(request()).await.unwrap()).await;
        assert_eq!(echoed["auth"], Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_upstream_content_type_kept() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = echo_upstream(hits).await;
        let app = router_for(Some(format!("http://{}/text", addr)), true);

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn test_missing_upstream_is_configuration_error() {
        let app = router_for(None, true);
        let response = app
            .oneshot(Request::get("/?action=getEvents").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "GAS_API_URL is not configured");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_proxy_error() {
        // Reserve a port, then free it so nothing is listening there
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let app = router_for(Some(format!("http://{}/exec", addr)), true);
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        let body = json_body(response).await;
        assert_eq!(body["error"], "Proxy Error");
        assert!(!body["message"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_status_is_relayed() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = echo_upstream(hits.clone()).await;

        let app = router_for(Some(format!("http://{}/missing", addr)), true);
        let response = app
            .oneshot(Request::get("/?action=getEvents").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(json_body(response).await["error"], "Not found");

        // Redirects are followed; the client sees the final answer
        let app = router_for(Some(format!("http://{}/moved", addr)), true);
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(json_body(response).await["query"], "moved=1");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_browser_accept_encoding_is_not_relayed() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = echo_upstream(hits).await;
        let app = router_for(Some(format!("http://{}/gzip", addr)), true);

        let response = app
            .oneshot(
                Request::get("/?action=getEvents")
                    .header("accept-encoding", "gzip, deflate, br")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("content-encoding").is_none());
        let echoed = json_body(response).await;
        assert_eq!(echoed["query"], "action=getEvents");
    }
}
