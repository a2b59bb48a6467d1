use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument as _, info};

use crate::completion::{AbortSignal, CompletionGuard, DoneCallback};
use crate::config::{ClusterConfig, WatchOptions};
use crate::errors::WatchError;
use crate::event::WatchEvent;
use crate::observability::session_span;
use crate::request::WatchRequest;
use crate::session::{EventSink, SessionHandle, SessionTask, WatchStream, run_session};
use crate::transport::{ReqwestTransport, WatchTransport};

struct WatchInner {
    config: Arc<dyn ClusterConfig>,
    transport: Arc<dyn WatchTransport>,
}

/// Entry point for starting watch sessions against the configured cluster.
#[derive(Clone)]
pub struct Watch {
    inner: Arc<WatchInner>,
}

impl Watch {
    /// Creates a watch client using the pooled `reqwest` transport.
    pub fn new(config: Arc<dyn ClusterConfig>) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransport::default()))
    }

    /// Creates a watch client with a custom connection layer.
    pub fn with_transport(config: Arc<dyn ClusterConfig>, transport: Arc<dyn WatchTransport>) -> Self {
        Self {
            inner: Arc::new(WatchInner { config, transport }),
        }
    }

    /// Starts building a watch on `path` (relative to the cluster server).
    pub fn request(&self, path: impl Into<String>) -> WatchBuilder {
        WatchBuilder {
            inner: self.inner.clone(),
            request: WatchRequest::new(path),
            options: WatchOptions::default(),
        }
    }
}

/// Builder for one watch session.
pub struct WatchBuilder {
    inner: Arc<WatchInner>,
    request: WatchRequest,
    options: WatchOptions,
}

impl WatchBuilder {
    /// Appends a query pair. A `watch` key is ignored; `watch=true` is always
    /// sent.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.query.push((key.into(), value.into()));
        self
    }

    /// Appends a request header. Invalid names or values are reported by
    /// `start`.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push((name.into(), value.into()));
        self
    }

    /// Replaces all session options.
    pub fn options(mut self, options: WatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn max_line_bytes(mut self, limit: usize) -> Self {
        self.options.max_line_bytes = Some(limit);
        self
    }

    pub fn report_server_close(mut self, enabled: bool) -> Self {
        self.options.report_server_close = enabled;
        self
    }

    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.options.stream_buffer_capacity = capacity;
        self
    }

    /// Starts the session and returns immediately.
    ///
    /// `on_event` runs once per decoded line, in stream order, never
    /// concurrently with itself. `on_done` runs exactly once when the session
    /// ends, after the connection has been told to abort.
    ///
    /// Fails synchronously when no cluster is resolvable, the request is
    /// invalid, or no tokio runtime is running.
    pub fn start<E, D>(self, on_event: E, on_done: D) -> Result<SessionHandle, WatchError>
    where
        E: FnMut(WatchEvent) + Send + 'static,
        D: FnOnce(Result<(), WatchError>) + Send + 'static,
    {
        self.launch(EventSink::Callback(Box::new(on_event)), Box::new(on_done))
    }

    /// Starts the session and returns a pull-style `WatchStream`.
    pub fn start_stream(self) -> Result<WatchStream, WatchError> {
        if self.options.stream_buffer_capacity == 0 {
            return Err(WatchError::invalid_request(
                "stream_buffer_capacity must be greater than 0",
            ));
        }
        let (tx, rx) = mpsc::channel(self.options.stream_buffer_capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let handle = self.launch(
            EventSink::Channel(tx),
            Box::new(move |outcome| {
                let _ = final_tx.send(outcome);
            }),
        )?;
        Ok(WatchStream::new(handle, rx, final_rx))
    }

    fn launch(self, sink: EventSink, on_done: DoneCallback) -> Result<SessionHandle, WatchError> {
        let cluster = self
            .inner
            .config
            .current_cluster()
            .ok_or_else(|| WatchError::config("no current cluster is configured"))?;
        let session_id = uuid::Uuid::new_v4();
        let request = self.request.prepare(session_id, cluster)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            WatchError::config("watch sessions require a running tokio runtime")
        })?;

        let (abort, abort_rx) = AbortSignal::new();
        let guard = CompletionGuard::new(abort.clone(), self.options.report_server_close, on_done);
        let span = session_span(&request);
        span.in_scope(|| info!("starting watch session"));
        let task = run_session(SessionTask {
            config: self.inner.config.clone(),
            transport: self.inner.transport.clone(),
            request,
            max_line_bytes: self.options.max_line_bytes,
            sink,
            guard: guard.clone(),
            abort_rx,
        });
        runtime.spawn(task.instrument(span));
        Ok(SessionHandle::new(session_id, abort, guard))
    }
}
