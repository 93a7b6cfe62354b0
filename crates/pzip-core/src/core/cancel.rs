use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

/// Cancellation-with-cause primitive.
///
/// The first `cancel` wins (atomic swap) and records its cause; the
/// signal channel's sender is dropped so every clone's
/// [`CancelToken::signal`] receiver becomes ready inside a
/// `crossbeam_channel::select!`.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug)]
struct CancelInner {
    cancelled: AtomicBool,
    cause: Mutex<Option<String>>,
    guard: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                cause: Mutex::new(None),
                guard: Mutex::new(Some(tx)),
                signal: rx,
            }),
        }
    }

    /// Fires the token. Only the first call records its cause;
    /// subsequent calls are no-ops.
    pub fn cancel(&self, cause: impl Into<String>) {
        if self
            .inner
            .cancelled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            *self.inner.cause.lock() = Some(cause.into());
            // Dropping the sender disconnects the signal channel.
            self.inner.guard.lock().take();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// The recorded cause, if the token has fired.
    pub fn cause(&self) -> Option<String> {
        self.inner.cause.lock().clone()
    }

    /// Receiver that becomes ready (disconnected) once the token
    /// fires; usable as a `recv` arm in `select!`.
    pub fn signal(&self) -> Receiver<()> {
        self.inner.signal.clone()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_cause_wins() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.cause(), None);

        token.cancel("first failure");
        token.cancel("second failure");
        assert!(token.is_cancelled());
        assert_eq!(token.cause().as_deref(), Some("first failure"));
    }

    #[test]
    fn signal_fires_for_all_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        let signal = clone.signal();
        assert!(signal.try_recv().is_err());

        token.cancel("stop");
        // Disconnected once the guard sender is dropped.
        assert!(signal.recv().is_err());
    }
}
