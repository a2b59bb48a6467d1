use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use crate::errors::WatchError;

/// TLS material handed to the transport when it builds a pooled client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsMaterial {
    /// Extra root certificate(s), PEM encoded.
    pub ca_pem: Option<Vec<u8>>,
    /// Client certificate chain and private key, PEM encoded.
    pub identity_pem: Option<Vec<u8>>,
    /// Disables server certificate verification.
    pub insecure_skip_verify: bool,
}

/// A resolved cluster endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cluster {
    /// Stable name, also used to key the watch connection pool.
    pub name: String,
    /// Base URL, e.g. `https://10.0.0.1:6443`. May carry a path prefix.
    pub server: String,
    pub tls: TlsMaterial,
}

impl Cluster {
    pub fn new(name: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server: server.into(),
            tls: TlsMaterial::default(),
        }
    }

    pub fn tls(mut self, tls: TlsMaterial) -> Self {
        self.tls = tls;
        self
    }
}

/// Source of cluster endpoints and request authentication.
///
/// Implementations resolve the current cluster and decorate outgoing watch
/// requests (bearer tokens, impersonation headers and so on).
#[async_trait::async_trait]
pub trait ClusterConfig: Send + Sync {
    /// Returns the cluster new watches should target, if one is configured.
    fn current_cluster(&self) -> Option<Cluster>;

    /// Adds authentication headers to a watch request before it is sent.
    async fn decorate(&self, headers: &mut HeaderMap) -> Result<(), WatchError>;
}

/// Request authentication applied by `StaticClusterConfig`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ClusterAuth {
    #[default]
    None,
    Bearer(String),
}

/// Fixed cluster configuration, typically loaded from the environment.
#[derive(Clone, Debug, Default)]
pub struct StaticClusterConfig {
    cluster: Option<Cluster>,
    auth: ClusterAuth,
}

impl StaticClusterConfig {
    /// Creates a config that always resolves to `cluster`.
    pub fn new(cluster: Cluster) -> Self {
        Self {
            cluster: Some(cluster),
            auth: ClusterAuth::None,
        }
    }

    /// Sets a bearer token sent on every watch request.
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.auth = ClusterAuth::Bearer(token.into());
        self
    }

    /// Builds a config from `CLUSTER_WATCH_*` environment variables.
    ///
    /// - `CLUSTER_WATCH_SERVER`: required base URL.
    /// - `CLUSTER_WATCH_CLUSTER_NAME`: optional name (default `default`).
    /// - `CLUSTER_WATCH_TOKEN`: optional bearer token.
    /// - `CLUSTER_WATCH_CA_FILE`: optional PEM root certificate path.
    /// - `CLUSTER_WATCH_INSECURE_SKIP_VERIFY`: optional boolean flag.
    pub fn from_env() -> Result<Self, WatchError> {
        let server = std::env::var("CLUSTER_WATCH_SERVER").unwrap_or_default();
        if server.trim().is_empty() {
            return Err(WatchError::config(
                "missing CLUSTER_WATCH_SERVER for cluster config",
            ));
        }
        let name = std::env::var("CLUSTER_WATCH_CLUSTER_NAME")
            .ok()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "default".to_string());

        let mut tls = TlsMaterial::default();
        if let Ok(path) = std::env::var("CLUSTER_WATCH_CA_FILE")
            && !path.trim().is_empty()
        {
            let pem = std::fs::read(&path)
                .map_err(|e| WatchError::config(format!("failed to read CA file {path}: {e}")))?;
            tls.ca_pem = Some(pem);
        }
        if let Ok(value) = std::env::var("CLUSTER_WATCH_INSECURE_SKIP_VERIFY") {
            tls.insecure_skip_verify = parse_bool_env(&value).unwrap_or(false);
        }

        let mut config = Self::new(Cluster::new(name, server.trim()).tls(tls));
        if let Ok(token) = std::env::var("CLUSTER_WATCH_TOKEN")
            && !token.trim().is_empty()
        {
            config = config.bearer_token(token.trim());
        }
        Ok(config)
    }
}

#[async_trait::async_trait]
impl ClusterConfig for StaticClusterConfig {
    fn current_cluster(&self) -> Option<Cluster> {
        self.cluster.clone()
    }

    async fn decorate(&self, headers: &mut HeaderMap) -> Result<(), WatchError> {
        if let ClusterAuth::Bearer(token) = &self.auth {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| WatchError::config(format!("invalid bearer token: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Ok(())
    }
}

/// Per-session watch behaviour.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WatchOptions {
    /// Longest line accepted before the session fails. `None` is unbounded.
    pub max_line_bytes: Option<usize>,
    /// Report a clean server-side end of stream as
    /// `WatchError::ServerSideClose` instead of `Ok(())`.
    pub report_server_close: bool,
    /// Event buffer size used by `WatchStream`.
    pub stream_buffer_capacity: usize,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            max_line_bytes: None,
            report_server_close: false,
            stream_buffer_capacity: 128,
        }
    }
}

pub(crate) fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_options_defaults() {
        let options = WatchOptions::default();
        assert_eq!(options.stream_buffer_capacity, 128);
        assert_eq!(options.max_line_bytes, None);
        assert!(!options.report_server_close);
    }

    #[test]
    fn default_static_config_has_no_cluster() {
        assert!(StaticClusterConfig::default().current_cluster().is_none());
    }

    #[tokio::test]
    async fn bearer_token_is_applied_as_sensitive_header() {
        let config = StaticClusterConfig::new(Cluster::new("c", "http://127.0.0.1"))
            .bearer_token("abc");
        let mut headers = HeaderMap::new();
        config.decorate(&mut headers).await.expect("decorate");
        let value = headers.get(AUTHORIZATION).expect("auth header");
        assert_eq!(value.to_str().expect("ascii"), "Bearer abc");
        assert!(value.is_sensitive());
    }

    #[test]
    fn parse_bool_env_accepts_common_spellings() {
        assert_eq!(parse_bool_env(" Yes "), Some(true));
        assert_eq!(parse_bool_env("off"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }
}
