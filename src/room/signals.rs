//! One-shot readiness signals shared between a room and its engine.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

/// A one-shot, non-blocking signal.
///
/// Raising never blocks: when a raise is already pending it is dropped.
/// Waiting consumes exactly one raise. Consumers drain before reuse so a
/// raise left over from an earlier step cannot leak into the next one.
#[derive(Debug, Clone)]
pub struct ReadySignal {
    tx: mpsc::Sender<()>,
    rx: Arc<Mutex<mpsc::Receiver<()>>>,
}

impl ReadySignal {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Raise the signal; a no-op when a raise is already pending.
    pub fn raise(&self) {
        let _ = self.tx.try_send(());
    }

    /// Wait for the next raise, consuming it.
    pub async fn wait(&self) {
        let mut rx = self.rx.lock().await;
        let _ = rx.recv().await;
    }

    /// Discard any pending raise. Skipped when a waiter currently holds the
    /// receiver, in which case the waiter consumes it instead.
    pub fn drain(&self) {
        if let Ok(mut rx) = self.rx.try_lock() {
            while rx.try_recv().is_ok() {}
        }
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}
