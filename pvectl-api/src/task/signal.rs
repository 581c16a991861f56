//! One-shot broadcast "done" signal.

use tokio::sync::watch;

/// A signal that starts open and is closed at most once.
///
/// Any number of tasks may wait on it; all of them wake when it closes,
/// and waiting on an already closed signal returns immediately. Waiting on
/// several signals at once is a `tokio::select!` over their `wait()` futures.
#[derive(Debug)]
pub struct Signal {
    tx: watch::Sender<bool>,
}

impl Signal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Close the signal. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        self.tx.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal is closed.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so the only way out is `true`.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}
