use reqwest::Url;
use reqwest::header::{CONNECTION, HeaderMap, HeaderName, HeaderValue};

use crate::config::Cluster;
use crate::errors::WatchError;
use crate::pool::Scheme;

/// Caller-facing description of a watch: path, query and extra headers.
///
/// The method is always GET and `watch=true` is always sent, replacing any
/// `watch` pair supplied by the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WatchRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl WatchRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Resolves the request against `cluster` into its wire form.
    pub fn prepare(
        &self,
        session_id: uuid::Uuid,
        cluster: Cluster,
    ) -> Result<PreparedRequest, WatchError> {
        let path = self.path.trim();
        if path.is_empty() {
            return Err(WatchError::invalid_request("watch path must not be empty"));
        }
        let base = cluster.server.trim().trim_end_matches('/');
        let base_url = Url::parse(base).map_err(|e| {
            WatchError::config(format!(
                "cluster {} has an invalid server url {base:?}: {e}",
                cluster.name
            ))
        })?;
        let scheme = Scheme::from_url(&base_url)?;

        let separator = if path.starts_with('/') { "" } else { "/" };
        let mut url = Url::parse(&format!("{base}{separator}{path}"))
            .map_err(|e| WatchError::invalid_request(format!("invalid watch path {path:?}: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in self.query.iter().filter(|(key, _)| key != "watch") {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("watch", "true");
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| WatchError::invalid_request(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| WatchError::invalid_request(format!("invalid value for header {name}: {e}")))?;
            headers.append(name, value);
        }
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        Ok(PreparedRequest {
            session_id,
            cluster,
            scheme,
            url,
            headers,
        })
    }
}

/// A watch request resolved against a cluster, ready for a transport.
#[derive(Clone, Debug)]
pub struct PreparedRequest {
    pub session_id: uuid::Uuid,
    pub cluster: Cluster,
    pub scheme: Scheme,
    pub url: Url,
    pub headers: HeaderMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(server: &str) -> Cluster {
        Cluster::new("test", server)
    }

    fn query_of(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn watch_flag_is_forced_and_caller_pairs_kept() {
        let request = WatchRequest {
            path: "/api/v1/pods".into(),
            query: vec![
                ("watch".into(), "false".into()),
                ("labelSelector".into(), "app=web tier".into()),
            ],
            headers: Vec::new(),
        };
        let prepared = request
            .prepare(uuid::Uuid::new_v4(), cluster("https://example.test:6443/"))
            .expect("prepare");
        assert_eq!(prepared.url.path(), "/api/v1/pods");
        assert_eq!(prepared.scheme, Scheme::Encrypted);
        assert_eq!(
            query_of(&prepared.url),
            vec![
                ("labelSelector".to_string(), "app=web tier".to_string()),
                ("watch".to_string(), "true".to_string()),
            ]
        );
        assert!(
            prepared
                .url
                .query()
                .unwrap_or_default()
                .contains("app%3Dweb+tier")
        );
    }

    #[test]
    fn server_path_prefix_is_preserved() {
        let prepared = WatchRequest::new("api/v1/nodes")
            .prepare(uuid::Uuid::new_v4(), cluster("http://proxy.test/k8s"))
            .expect("prepare");
        assert_eq!(prepared.url.path(), "/k8s/api/v1/nodes");
        assert_eq!(prepared.scheme, Scheme::Plain);
    }

    #[test]
    fn headers_include_keep_alive_and_caller_values() {
        let request = WatchRequest {
            path: "/things".into(),
            query: Vec::new(),
            headers: vec![("x-trace".into(), "abc".into())],
        };
        let prepared = request
            .prepare(uuid::Uuid::new_v4(), cluster("http://127.0.0.1:8080"))
            .expect("prepare");
        assert_eq!(
            prepared.headers.get(CONNECTION).and_then(|v| v.to_str().ok()),
            Some("keep-alive")
        );
        assert_eq!(
            prepared.headers.get("x-trace").and_then(|v| v.to_str().ok()),
            Some("abc")
        );
    }

    #[test]
    fn invalid_server_is_config_error() {
        let err = WatchRequest::new("/x")
            .prepare(uuid::Uuid::new_v4(), cluster("not a url"))
            .expect_err("invalid server");
        assert!(matches!(err, WatchError::Config(_)));

        let err = WatchRequest::new("/x")
            .prepare(uuid::Uuid::new_v4(), cluster("ftp://example.test"))
            .expect_err("unsupported scheme");
        assert!(matches!(err, WatchError::Config(_)));
    }

    #[test]
    fn bad_path_and_headers_are_request_errors() {
        let err = WatchRequest::new("  ")
            .prepare(uuid::Uuid::new_v4(), cluster("http://127.0.0.1"))
            .expect_err("empty path");
        assert!(matches!(err, WatchError::InvalidRequest(_)));

        let request = WatchRequest {
            path: "/x".into(),
            query: Vec::new(),
            headers: vec![("bad header".into(), "v".into())],
        };
        let err = request
            .prepare(uuid::Uuid::new_v4(), cluster("http://127.0.0.1"))
            .expect_err("bad header");
        assert!(matches!(err, WatchError::InvalidRequest(_)));
    }
}
