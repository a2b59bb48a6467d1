use std::pin::Pin;
use std::time::Duration;

use futures::StreamExt as _;
use reqwest::StatusCode;
use tracing::debug;

use crate::config::Cluster;
use crate::errors::WatchError;
use crate::pool::{ClientRegistry, PoolKey};
use crate::request::PreparedRequest;

/// Unconsumed response body. Read failures surface as `WatchError::Transport`
/// items.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, WatchError>> + Send + 'static>>;

/// A response whose status line has arrived but whose body is untouched.
///
/// The body only becomes readable through `ResponseGate::admit`.
pub struct PendingResponse {
    pub status: StatusCode,
    pub(crate) body: ByteStream,
}

impl PendingResponse {
    pub fn new(status: StatusCode, body: ByteStream) -> Self {
        Self { status, body }
    }
}

/// Connection layer used by watch sessions.
///
/// `open` issues exactly one streaming GET and returns once the response
/// status is known. Connect and TLS failures are returned as
/// `WatchError::Transport`.
#[async_trait::async_trait]
pub trait WatchTransport: Send + Sync {
    async fn open(&self, request: PreparedRequest) -> Result<PendingResponse, WatchError>;
}

/// `reqwest`-backed transport with a dedicated watch connection pool.
pub struct ReqwestTransport {
    registry: &'static ClientRegistry,
    connect_timeout: Duration,
    tcp_keepalive: Option<Duration>,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self {
            registry: ClientRegistry::global(),
            connect_timeout: Duration::from_secs(30),
            tcp_keepalive: Some(Duration::from_secs(60)),
        }
    }
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `registry` instead of the process-wide watch registry.
    pub fn with_registry(mut self, registry: &'static ClientRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Upper bound on establishing the TCP/TLS connection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// TCP keep-alive interval for watch sockets (`None` disables it).
    pub fn tcp_keepalive(mut self, interval: Option<Duration>) -> Self {
        self.tcp_keepalive = interval;
        self
    }

    fn build_client(&self, cluster: &Cluster) -> Result<reqwest::Client, WatchError> {
        // No overall timeout: a watch body is unbounded.
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .tcp_keepalive(self.tcp_keepalive)
            .danger_accept_invalid_certs(cluster.tls.insecure_skip_verify);
        if let Some(pem) = &cluster.tls.ca_pem {
            let cert = reqwest::Certificate::from_pem(pem).map_err(|e| {
                WatchError::config(format!("invalid CA certificate for {}: {e}", cluster.name))
            })?;
            builder = builder.add_root_certificate(cert);
        }
        if let Some(pem) = &cluster.tls.identity_pem {
            let identity = reqwest::Identity::from_pem(pem).map_err(|e| {
                WatchError::config(format!("invalid client identity for {}: {e}", cluster.name))
            })?;
            builder = builder.identity(identity);
        }
        builder.build().map_err(|e| {
            WatchError::config(format!("failed to build watch client for {}: {e}", cluster.name))
        })
    }
}

#[async_trait::async_trait]
impl WatchTransport for ReqwestTransport {
    async fn open(&self, request: PreparedRequest) -> Result<PendingResponse, WatchError> {
        let key = PoolKey {
            cluster: request.cluster.name.clone(),
            scheme: request.scheme,
        };
        let client = self
            .registry
            .client_for(&key, || self.build_client(&request.cluster))?;
        debug!(
            session_id = %request.session_id,
            cluster = %request.cluster.name,
            path = request.url.path(),
            "opening watch connection"
        );

        let response = client
            .get(request.url)
            .headers(request.headers)
            .send()
            .await
            .map_err(|e| WatchError::transport(format!("watch request failed: {e}")))?;
        let status = response.status();
        let body: ByteStream = Box::pin(response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| WatchError::transport(format!("watch stream read failed: {e}")))
        }));
        Ok(PendingResponse::new(status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::WatchRequest;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn leaked_registry() -> &'static ClientRegistry {
        Box::leak(Box::new(ClientRegistry::default()))
    }

    fn prepared(server: &str, cluster: &str) -> PreparedRequest {
        WatchRequest::new("/api/v1/pods")
            .prepare(uuid::Uuid::new_v4(), Cluster::new(cluster, server))
            .expect("prepare")
    }

    async fn read_all(mut body: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.expect("chunk"));
        }
        out
    }

    #[tokio::test]
    async fn open_sends_watch_get_and_exposes_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/pods"))
            .and(query_param("watch", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"type\":\"ADDED\"}\n"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new().with_registry(leaked_registry());
        let pending = transport
            .open(prepared(&server.uri(), "c1"))
            .await
            .expect("open");
        assert_eq!(pending.status, StatusCode::OK);
        assert_eq!(read_all(pending.body).await, b"{\"type\":\"ADDED\"}\n");
    }

    #[tokio::test]
    async fn sessions_to_one_cluster_share_a_pool() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let registry = leaked_registry();
        let transport = ReqwestTransport::new().with_registry(registry);
        for cluster in ["c1", "c1", "c2"] {
            let pending = transport
                .open(prepared(&server.uri(), cluster))
                .await
                .expect("open");
            drop(pending);
        }
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("bind listener");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let transport = ReqwestTransport::new()
            .with_registry(leaked_registry())
            .connect_timeout(Duration::from_secs(2));
        let err = match transport
            .open(prepared(&format!("http://{addr}"), "refused"))
            .await
        {
            Ok(_) => panic!("connect should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, WatchError::Transport(_)));
    }
}
