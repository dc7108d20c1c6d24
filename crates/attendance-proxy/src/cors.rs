//! Static CORS headers attached to every proxy response.

use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ProxyError;
use crate::AppState;

const ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// Preflight results may be cached for a day
const MAX_AGE_SECS: &str = "86400";

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allow_origin: HeaderValue,
    allow_methods: HeaderValue,
}

impl CorsPolicy {
    pub fn new(allow_origin: &str, allow_methods: &str) -> Result<Self, ProxyError> {
        let value = |name: &str, raw: &str| {
            HeaderValue::from_str(raw.trim())
                .map_err(|_| ProxyError::Config(format!("{} is not a valid header value", name)))
        };
        Ok(Self {
            allow_origin: value("ALLOWED_ORIGIN", allow_origin)?,
            allow_methods: value("ALLOWED_METHODS", allow_methods)?,
        })
    }

    pub fn allow_origin(&self) -> &str {
        self.allow_origin.to_str().unwrap_or_default()
    }

    /// Insert the CORS headers, replacing any the upstream sent
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
        headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE_SECS));
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allow_origin: HeaderValue::from_static("*"),
            allow_methods: HeaderValue::from_static("GET, POST, OPTIONS"),
        }
    }
}

/// Answers preflights directly and decorates everything else on the way out.
pub async fn cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        state.config.cors.apply(response.headers_mut());
        return response;
    }
    let mut response = next.run(request).await;
    state.config.cors.apply(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_overwrites_upstream_values() {
        let policy = CorsPolicy::new("https://portal.example.com", "GET, POST").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("https://other"));

        policy.apply(&mut headers);
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "https://portal.example.com");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], "GET, POST");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type, Authorization");
        assert_eq!(headers[ACCESS_CONTROL_MAX_AGE], "86400");
    }

    #[test]
    fn test_rejects_unsendable_values() {
        assert!(CorsPolicy::new("https://a\nb", "GET").is_err());
    }
}
