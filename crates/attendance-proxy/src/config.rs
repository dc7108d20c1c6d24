//! Proxy configuration loaded from environment variables.
//!
//! Every setting comes from the environment (or a `.env` file via
//! `dotenvy`, loaded by the binary).

use std::net::SocketAddr;

use reqwest::Url;

use crate::cors::CorsPolicy;
use crate::error::ProxyError;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8787";

/// Some dashboards save the upstream under this name instead
const FALLBACK_URL_KEY: &str = "GET_API_URL";

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Socket address to bind (`LISTEN_ADDR`)
    pub listen_addr: SocketAddr,

    /// Backend deployment URL. `None` makes every request fail with a
    /// configuration error instead of refusing to start.
    pub upstream_url: Option<Url>,

    pub cors: CorsPolicy,

    /// Copy inbound request headers onto the upstream request
    pub forward_headers: bool,
}

impl ProxyConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Fails when `LISTEN_ADDR` or the upstream URL is set but malformed,
    /// or a CORS value cannot be sent as a header.
    pub fn from_env() -> Result<Self, ProxyError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ProxyError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_addr = var("LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse()
            .map_err(|e| ProxyError::Config(format!("LISTEN_ADDR: {}", e)))?;

        let upstream_url = match var("GAS_API_URL").or_else(|| var(FALLBACK_URL_KEY)) {
            Some(raw) => Some(
                Url::parse(raw.trim())
                    .map_err(|e| ProxyError::Config(format!("GAS_API_URL: {}", e)))?,
            ),
            None => None,
        };

        let cors = CorsPolicy::new(
            var("ALLOWED_ORIGIN").as_deref().unwrap_or("*"),
            var("ALLOWED_METHODS")
                .as_deref()
                .unwrap_or("GET, POST, OPTIONS"),
        )?;

        Ok(Self {
            listen_addr,
            upstream_url,
            cors,
            forward_headers: parse_bool(var("FORWARD_HEADERS").as_deref(), true),
        })
    }
}

/// `true`/`1`/`yes` and `false`/`0`/`no`, case-insensitive; anything else is `default`
fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true") | Some("1") | Some("yes") => true,
        Some("false") | Some("0") | Some("no") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ProxyConfig, ProxyError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ProxyConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.listen_addr.to_string(), "0.0.0.0:8787");
        assert!(config.upstream_url.is_none());
        assert!(config.forward_headers);
        assert_eq!(config.cors.allow_origin(), "*");
    }

    #[test]
    fn test_fallback_url_key() {
        let config = load(&[("GET_API_URL", "https://script.example.com/exec")]).unwrap();
        assert_eq!(
            config.upstream_url.unwrap().as_str(),
            "https://script.example.com/exec"
        );

        let config = load(&[
            ("GAS_API_URL", "https://primary.example.com/exec"),
            ("GET_API_URL", "https://secondary.example.com/exec"),
        ])
        .unwrap();
        assert_eq!(config.upstream_url.unwrap().host_str(), Some("primary.example.com"));
    }

    #[test]
    fn test_overrides_and_errors() {
        let config = load(&[
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("ALLOWED_ORIGIN", "https://portal.example.com"),
            ("FORWARD_HEADERS", "False"),
        ])
        .unwrap();
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.cors.allow_origin(), "https://portal.example.com");
        assert!(!config.forward_headers);

        assert!(matches!(
            load(&[("LISTEN_ADDR", "not an address")]),
            Err(ProxyError::Config(_))
        ));
        assert!(matches!(
            load(&[("GAS_API_URL", "::nope")]),
            Err(ProxyError::Config(_))
        ));
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool(Some("YES"), false));
        assert!(!parse_bool(Some("0"), true));
        assert!(parse_bool(Some("maybe"), true));
        assert!(!parse_bool(None, false));
    }
}
