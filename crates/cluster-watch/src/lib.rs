//! Streaming watch client for newline-delimited JSON change feeds.
//!
//! A watch session opens one long-lived `GET ...?watch=true` request, frames
//! the response body into lines, decodes each line into a [`WatchEvent`] and
//! hands it to the caller. Whatever ends the stream, the connection is dropped
//! and the completion callback runs exactly once.
//!
//! # Callback usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cluster_watch::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), WatchError> {
//! let watch = Watch::new(Arc::new(StaticClusterConfig::from_env()?));
//!
//! let handle = watch
//!     .request("/api/v1/namespaces/default/pods")
//!     .query("labelSelector", "app=web")
//!     .start(
//!         |event| println!("{} {}", event.event_type, event.object),
//!         |outcome| println!("watch ended: {outcome:?}"),
//!     )?;
//!
//! // Later, from anywhere:
//! handle.abort();
//! # Ok(())
//! # }
//! ```

/// Exactly-once completion and the abort signal.
pub mod completion;
/// Cluster configuration contract and per-session options.
pub mod config;
/// Line to event decoding.
pub mod decoder;
/// Public error types.
pub mod errors;
/// Decoded watch events.
pub mod event;
/// Newline framing of the response body.
pub mod framer;
/// Status gate between response headers and body.
pub mod gate;
/// Tracing subscriber setup for binaries.
pub mod observability;
/// Connection-pool identity for watch traffic.
pub mod pool;
/// Common imports for typical usage.
pub mod prelude;
/// Watch request assembly.
pub mod request;
/// Session task, handle and pull-style stream.
pub mod session;
/// Connection layer contract and the `reqwest` implementation.
pub mod transport;
/// Entry point and session builder.
pub mod watch;

pub use completion::{AbortSignal, CompletionGuard, Trigger};
pub use config::{Cluster, ClusterAuth, ClusterConfig, StaticClusterConfig, TlsMaterial, WatchOptions};
pub use decoder::{DecodeError, decode_line};
pub use errors::WatchError;
pub use event::{WatchEvent, WatchEventType};
pub use framer::{LineFramer, LineOverflow};
pub use gate::ResponseGate;
pub use pool::{ClientRegistry, PoolKey, Scheme};
pub use request::{PreparedRequest, WatchRequest};
pub use session::{SessionHandle, WatchStream};
pub use transport::{ByteStream, PendingResponse, ReqwestTransport, WatchTransport};
pub use watch::{Watch, WatchBuilder};
