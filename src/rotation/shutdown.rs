use std::time::Duration;
use tokio::sync::watch;

/// Result of a cancellable wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Elapsed,
    Interrupted,
}

/// Sending half: requests a clean stop at the next loop boundary
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn request(&self) {
        // send_replace works even when every receiver is gone
        self.tx.send_replace(true);
    }
}

/// Receiving half, checked by the controller between operations
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl Shutdown {
    /// A signal that never fires
    #[cfg(test)]
    pub fn never() -> Self {
        channel().1
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested; pend forever if the trigger is dropped
    pub async fn requested(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `duration` unless shutdown is requested first
    pub async fn sleep(&mut self, duration: Duration) -> Wait {
        if self.is_requested() {
            return Wait::Interrupted;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => Wait::Elapsed,
            _ = self.requested() => Wait::Interrupted,
        }
    }
}
