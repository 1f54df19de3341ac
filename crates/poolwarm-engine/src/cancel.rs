//! Cooperative cancellation for save and restore.

use tokio::sync::watch;

/// Sending half. Cancelling is idempotent.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Receiving half, polled between batches.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle and signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Another signal observing this handle.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancelSignal {
    /// A signal that is never raised.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_reaches_every_signal() {
        let (handle, signal) = cancel_pair();
        let other = handle.signal();
        let cloned = signal.clone();
        assert!(!signal.is_cancelled());

        handle.cancel();
        handle.cancel();
        assert!(signal.is_cancelled());
        assert!(other.is_cancelled());
        assert!(cloned.is_cancelled());
    }

    #[test]
    fn test_never_stays_clear() {
        let signal = CancelSignal::never();
        assert!(!signal.is_cancelled());
    }

    #[test]
    fn test_signal_survives_dropped_handle() {
        let (handle, signal) = cancel_pair();
        handle.cancel();
        drop(handle);
        assert!(signal.is_cancelled());
    }
}
