/// Errors surfaced by the watch client.
///
/// Configuration and request errors are returned synchronously from
/// `WatchBuilder::start`. Everything else reaches the caller exactly once
/// through the completion callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatchError {
    /// No resolvable cluster endpoint or an unusable client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Caller-supplied request parts (path, headers) were rejected.
    #[error("invalid watch request: {0}")]
    InvalidRequest(String),
    /// Connect, TLS or mid-stream socket failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The server answered the watch request with a non-success status.
    #[error("watch request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    /// A single line grew past the configured framing bound.
    #[error("watch line exceeded {limit} bytes without a line boundary")]
    LineTooLong { limit: usize },
    /// The server ended the stream. Only reported when
    /// `WatchOptions::report_server_close` is enabled.
    #[error("connection closed on server")]
    ServerSideClose,
    /// The session was aborted through its `SessionHandle`.
    #[error("watch aborted")]
    Aborted,
}

impl WatchError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub(crate) fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Returns `true` for the server-side close sentinel.
    pub fn is_server_side_close(&self) -> bool {
        matches!(self, Self::ServerSideClose)
    }

    /// Returns the HTTP status for `Status` errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
