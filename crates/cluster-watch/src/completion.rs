use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use crate::errors::WatchError;

/// Callback receiving the single terminal outcome of a session.
pub type DoneCallback = Box<dyn FnOnce(Result<(), WatchError>) + Send + 'static>;

/// Shared abort flag for one session's connection.
///
/// Raising it is idempotent. The session task watches the receiver and drops
/// the connection when the flag goes up.
#[derive(Clone)]
pub struct AbortSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortSignal {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub fn raise(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_raised(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Signal that ends a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Connect, TLS or status failure before the body was admitted.
    ConnectionError(WatchError),
    /// Body read failure or framing bound exceeded.
    FramerError(WatchError),
    /// The body ended without error.
    FramerClosed,
    /// The caller aborted, or the session task went away.
    Aborted,
}

struct GuardInner {
    fired: AtomicBool,
    abort: AbortSignal,
    report_server_close: bool,
    on_done: Mutex<Option<DoneCallback>>,
}

/// Exactly-once completion for a watch session.
///
/// Any number of triggers may race from any thread. The first one raises the
/// abort signal and then runs the callback; every later trigger is a no-op.
#[derive(Clone)]
pub struct CompletionGuard {
    inner: Arc<GuardInner>,
}

impl CompletionGuard {
    pub fn new(abort: AbortSignal, report_server_close: bool, on_done: DoneCallback) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                fired: AtomicBool::new(false),
                abort,
                report_server_close,
                on_done: Mutex::new(Some(on_done)),
            }),
        }
    }

    /// Completes the session with `trigger` unless it already completed.
    ///
    /// Returns `true` only for the call that won.
    pub fn fire(&self, trigger: Trigger) -> bool {
        if self
            .inner
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.inner.abort.raise();

        debug!(?trigger, "watch session completing");
        let outcome = self.outcome(trigger);
        let callback = self
            .inner
            .on_done
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(callback) = callback {
            callback(outcome);
        }
        true
    }

    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Returns a scope that fires `Trigger::Aborted` when dropped.
    pub(crate) fn fire_on_drop(&self) -> FireOnDrop {
        FireOnDrop(self.clone())
    }

    fn outcome(&self, trigger: Trigger) -> Result<(), WatchError> {
        match trigger {
            Trigger::ConnectionError(err) | Trigger::FramerError(err) => Err(err),
            Trigger::FramerClosed if self.inner.report_server_close => {
                Err(WatchError::ServerSideClose)
            }
            Trigger::FramerClosed => Ok(()),
            Trigger::Aborted => Err(WatchError::Aborted),
        }
    }
}

pub(crate) struct FireOnDrop(CompletionGuard);

impl Drop for FireOnDrop {
    fn drop(&mut self) {
        self.0.fire(Trigger::Aborted);
    }
}
