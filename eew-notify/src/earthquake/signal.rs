//! Set-once completion signals.
//!
//! The intensity estimate and the map drawing for an earthquake finish on other
//! tasks. Consumers await them through a [`Completion`], which resolves with the
//! first value ever set and ignores later ones.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
pub struct Completion<T: Clone> {
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T: Clone> Completion<T> {
    /// A signal that has not completed yet.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// A signal that is already complete.
    pub fn ready(value: T) -> Self {
        let signal = Self::new();
        signal.complete(value);
        signal
    }

    /// Complete the signal. Returns `false` if it was already complete.
    pub fn complete(&self, value: T) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(value);
                true
            } else {
                false
            }
        })
    }

    pub fn is_complete(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The value, if already complete.
    pub fn get(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    /// Wait until the signal completes.
    pub async fn wait(&self) -> T {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(value) = rx.borrow_and_update().as_ref() {
                return value.clone();
            }
            // The sender lives as long as `self`, so this only wakes on a new value.
            let _ = rx.changed().await;
        }
    }
}

impl<T: Clone> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("complete", &self.is_complete())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_resolves_after_complete() {
        let signal: Completion<u32> = Completion::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        assert!(signal.complete(7));
        assert_eq!(waiter.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_first_value_wins() {
        let signal = Completion::ready("first");
        assert!(!signal.complete("second"));
        assert_eq!(signal.wait().await, "first");
        assert_eq!(signal.get(), Some("first"));
    }
}
