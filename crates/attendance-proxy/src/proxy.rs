//! The pass-through handler.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use axum::response::{IntoResponse, Response};
use reqwest::Url;
use tracing::{debug, info};

use crate::error::ProxyError;
use crate::AppState;

/// Connection-scoped headers that must not be relayed
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Upstream URL with the inbound query appended to whatever it already carries.
pub fn upstream_url(base: &Url, inbound_query: Option<&str>) -> Url {
    let mut url = base.clone();
    if let Some(extra) = inbound_query.filter(|q| !q.is_empty()) {
        let query = match base.query() {
            Some(existing) if !existing.is_empty() => format!("{}&{}", existing, extra),
            _ => extra.to_string(),
        };
        url.set_query(Some(&query));
    }
    url
}

/// Headers for the upstream request. Always carries a content type.
///
/// `Accept-Encoding` is dropped: the client does not decompress, so the
/// upstream must answer in identity encoding.
pub fn forwarded_headers(inbound: &HeaderMap, forward: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if forward {
        for (name, value) in inbound {
            if is_forwardable(name) {
                headers.append(name.clone(), value.clone());
            }
        }
    }
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    headers
}

fn is_forwardable(name: &HeaderName) -> bool {
    *name != HOST
        && *name != CONTENT_LENGTH
        && *name != ACCEPT_ENCODING
        && !HOP_BY_HOP.contains(&name.as_str())
}

/// Relay any request to the backend and hand its answer back.
pub async fn forward(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let base = state
        .config
        .upstream_url
        .as_ref()
        .ok_or(ProxyError::NotConfigured)?;
    let url = upstream_url(base, uri.query());
    debug!(method = %method, path = %uri.path(), "Forwarding request");

    let mut request = state
        .client
        .request(method.clone(), url)
        .headers(forwarded_headers(&headers, state.config.forward_headers));
    if method == Method::POST {
        request = request.body(body);
    }

    let upstream = request.send().await?;
    let status = upstream.status();
    let content_type = upstream
        .headers()
        .get(CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    let content_encoding = upstream.headers().get(CONTENT_ENCODING).cloned();
    let bytes = upstream.bytes().await?;
    info!(method = %method, status = status.as_u16(), bytes = bytes.len(), "Upstream responded");

    let mut response = (status, bytes).into_response();
    response.headers_mut().insert(CONTENT_TYPE, content_type);
    // Unsolicited compression is relayed as-is, labelled as such
    if let Some(encoding) = content_encoding {
        response.headers_mut().insert(CONTENT_ENCODING, encoding);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_url_appends_query() {
        let base = Url::parse("https://script.example.com/exec?v=2").unwrap();
        assert_eq!(
            upstream_url(&base, Some("action=getEvents&token=t")).as_str(),
            "https://script.example.com/exec?v=2&action=getEvents&token=t"
        );

        let bare = Url::parse("https://script.example.com/exec").unwrap();
        assert_eq!(
            upstream_url(&bare, Some("action=getEvents")).as_str(),
            "https://script.example.com/exec?action=getEvents"
        );
        assert_eq!(upstream_url(&bare, Some("")).as_str(), "https://script.example.com/exec");
        assert_eq!(upstream_url(&bare, None).as_str(), "https://script.example.com/exec");
    }

    #[test]
    fn test_forwarded_headers() {
        let mut inbound = HeaderMap::new();
        inbound.insert(HOST, HeaderValue::from_static("proxy.local"));
        inbound.insert("connection", HeaderValue::from_static("keep-alive"));
        inbound.insert("authorization", HeaderValue::from_static("Bearer tok"));
        inbound.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        inbound.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));

        let headers = forwarded_headers(&inbound, true);
        assert!(headers.get(HOST).is_none());
        assert!(headers.get(ACCEPT_ENCODING).is_none());
        assert!(headers.get("connection").is_none());
        assert_eq!(headers["authorization"], "Bearer tok");
        assert_eq!(headers[CONTENT_TYPE], "text/plain");

        let headers = forwarded_headers(&inbound, false);
        assert!(headers.get("authorization").is_none());
        assert_eq!(headers[CONTENT_TYPE], "application/json");
    }
}
