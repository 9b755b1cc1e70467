//! Cooperative cancellation signal.

use std::sync::Arc;

use tokio::sync::watch;

/// A one-way cancellation signal shared by a job and its in-flight work.
///
/// Sync code polls [`is_cancelled`](Self::is_cancelled) between steps. Async
/// code can race a provider call against [`cancelled`](Self::cancelled).
#[derive(Debug, Clone)]
pub struct CancellationFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raises the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal is raised.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            // The sender lives as long as `self`, so this never errors here.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CancellationFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_flag_is_shared_between_clones() {
        let flag = CancellationFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
        flag.cancel();
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiters() {
        let flag = CancellationFlag::new();
        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.cancelled().await })
        };
        tokio::task::yield_now().await;
        flag.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .expect("task joined");
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_raised() {
        let flag = CancellationFlag::new();
        flag.cancel();
        tokio::time::timeout(Duration::from_millis(50), flag.cancelled())
            .await
            .expect("already cancelled");
    }
}
