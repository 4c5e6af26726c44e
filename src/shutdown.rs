//! Cooperative shutdown signal
//!
//! The accept loop owns the trigger; every connection worker holds a
//! `Shutdown` and checks it before each read.

use tokio::sync::watch;

/// Sending half: flips the signal for every `Shutdown` clone
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving half held by workers
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Create a linked trigger and signal
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // send_replace never fails, even with no receivers left
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is requested
    ///
    /// A dropped trigger counts as a request.
    pub async fn recv(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_trigger_wakes_all_clones() {
        let (trigger, shutdown) = channel();
        let mut first = shutdown.clone();
        let mut second = shutdown;

        assert!(!first.is_triggered());
        trigger.trigger();

        timeout(Duration::from_secs(1), first.recv()).await.unwrap();
        timeout(Duration::from_secs(1), second.recv()).await.unwrap();
        assert!(second.is_triggered());
    }

    #[tokio::test]
    async fn test_pending_until_triggered() {
        let (trigger, mut shutdown) = channel();

        assert!(timeout(Duration::from_millis(50), shutdown.recv()).await.is_err());

        drop(trigger);
        timeout(Duration::from_secs(1), shutdown.recv()).await.unwrap();
    }
}
