use std::sync::Arc;

use tokio::sync::watch;

/// One-shot broadcast: the first [`fire`](Signal::fire) wakes every
/// current and future waiter. Clones share the same signal.
#[derive(Debug, Clone)]
pub struct Signal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Returns true only for the call that actually fired the signal.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Completes once the signal has fired; immediately if it already has.
    pub async fn fired(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn only_the_first_fire_counts() {
        let signal = Signal::new();
        assert!(!signal.is_fired());
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.clone().is_fired());
    }

    #[tokio::test]
    async fn wakes_every_waiter() {
        let signal = Signal::new();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let signal = signal.clone();
                tokio::spawn(async move { signal.fired().await })
            })
            .collect();
        tokio::task::yield_now().await;
        signal.fire();
        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn late_waiters_complete_immediately() {
        let signal = Signal::new();
        signal.fire();
        tokio::time::timeout(Duration::from_millis(50), signal.fired())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unfired_signal_keeps_waiting() {
        let signal = Signal::new();
        let waited = tokio::time::timeout(Duration::from_secs(5), signal.fired()).await;
        assert!(waited.is_err());
    }
}
