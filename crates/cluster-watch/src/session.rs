use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::completion::{AbortSignal, CompletionGuard, Trigger};
use crate::config::ClusterConfig;
use crate::decoder::decode_line;
use crate::errors::WatchError;
use crate::event::WatchEvent;
use crate::framer::{LineFramer, frame_lines};
use crate::gate::ResponseGate;
use crate::request::PreparedRequest;
use crate::transport::WatchTransport;

/// Cancelable reference to a running watch session.
///
/// Cloning is cheap. `abort` may be called any number of times, from any
/// thread, before or after the session completes.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: uuid::Uuid,
    abort: AbortSignal,
    guard: CompletionGuard,
}

impl SessionHandle {
    pub(crate) fn new(session_id: uuid::Uuid, abort: AbortSignal, guard: CompletionGuard) -> Self {
        Self {
            session_id,
            abort,
            guard,
        }
    }

    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// Requests the session to stop.
    ///
    /// A session still running completes with `WatchError::Aborted`; a
    /// completed session is unaffected.
    pub fn abort(&self) {
        self.abort.raise();
    }

    /// Returns `true` once the completion callback has been invoked.
    pub fn is_finished(&self) -> bool {
        self.guard.is_fired()
    }
}

/// Where decoded events go.
pub(crate) enum EventSink {
    Callback(Box<dyn FnMut(WatchEvent) + Send + 'static>),
    Channel(mpsc::Sender<WatchEvent>),
}

impl EventSink {
    /// Returns `false` once the consumer is gone.
    async fn deliver(&mut self, event: WatchEvent) -> bool {
        match self {
            Self::Callback(on_event) => {
                on_event(event);
                true
            }
            Self::Channel(tx) => tx.send(event).await.is_ok(),
        }
    }
}

pub(crate) struct SessionTask {
    pub(crate) config: Arc<dyn ClusterConfig>,
    pub(crate) transport: Arc<dyn WatchTransport>,
    pub(crate) request: PreparedRequest,
    pub(crate) max_line_bytes: Option<usize>,
    pub(crate) sink: EventSink,
    pub(crate) guard: CompletionGuard,
    pub(crate) abort_rx: watch::Receiver<bool>,
}

/// Drives one session to completion. The guard fires exactly once, even if
/// this future is dropped early.
pub(crate) async fn run_session(task: SessionTask) {
    let SessionTask {
        config,
        transport,
        request,
        max_line_bytes,
        mut sink,
        guard,
        mut abort_rx,
    } = task;
    let _scope = guard.fire_on_drop();

    let trigger = tokio::select! {
        biased;
        () = wait_for_abort(&mut abort_rx) => Trigger::Aborted,
        trigger = drive(config, transport, request, max_line_bytes, &mut sink) => trigger,
    };
    debug!(?trigger, "watch session ended");
    guard.fire(trigger);
}

async fn wait_for_abort(rx: &mut watch::Receiver<bool>) {
    // The sender lives as long as the guard, so this only errors on teardown.
    let raised = rx.wait_for(|raised| *raised).await.map(|_| ());
    if raised.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn drive(
    config: Arc<dyn ClusterConfig>,
    transport: Arc<dyn WatchTransport>,
    mut request: PreparedRequest,
    max_line_bytes: Option<usize>,
    sink: &mut EventSink,
) -> Trigger {
    if let Err(err) = config.decorate(&mut request.headers).await {
        return Trigger::ConnectionError(err);
    }
    let pending = match transport.open(request).await {
        Ok(pending) => pending,
        Err(err) => return Trigger::ConnectionError(err),
    };
    let body = match ResponseGate::admit(pending).await {
        Ok(body) => body,
        Err(err) => return Trigger::ConnectionError(err),
    };

    let mut lines = std::pin::pin!(frame_lines(body, LineFramer::new(max_line_bytes)));
    let mut seq = 0_u64;
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(err) => return Trigger::FramerError(err),
        };
        match decode_line(&line) {
            Ok(event) => {
                debug!(seq, event_type = %event.event_type, "watch event");
                seq = seq.saturating_add(1);
                if !sink.deliver(event).await {
                    return Trigger::Aborted;
                }
            }
            Err(err) => {
                debug!(error = %err, line_bytes = line.len(), "dropping undecodable watch line");
            }
        }
    }
    Trigger::FramerClosed
}

/// Pull-style view of a watch session.
///
/// Events arrive in stream order through a bounded buffer. Dropping the
/// stream aborts the session.
pub struct WatchStream {
    handle: SessionHandle,
    rx: mpsc::Receiver<WatchEvent>,
    final_rx: oneshot::Receiver<Result<(), WatchError>>,
}

impl WatchStream {
    pub(crate) fn new(
        handle: SessionHandle,
        rx: mpsc::Receiver<WatchEvent>,
        final_rx: oneshot::Receiver<Result<(), WatchError>>,
    ) -> Self {
        Self {
            handle,
            rx,
            final_rx,
        }
    }

    pub fn session_id(&self) -> uuid::Uuid {
        self.handle.session_id()
    }

    /// Returns a handle that can abort the session.
    pub fn abort_handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Waits for the next event. Returns `None` once the session has ended
    /// and every buffered event was taken.
    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }

    /// Discards remaining events and returns the session outcome.
    ///
    /// This waits for the watch to end; abort first to stop it early.
    pub async fn finish(mut self) -> Result<(), WatchError> {
        while self.rx.recv().await.is_some() {}
        match (&mut self.final_rx).await {
            Ok(outcome) => outcome,
            Err(_) => Err(WatchError::Aborted),
        }
    }
}

impl futures::Stream for WatchStream {
    type Item = WatchEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for WatchStream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
