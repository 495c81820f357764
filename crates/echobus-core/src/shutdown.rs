//! Cooperative shutdown token shared between `Quit`, Ctrl-C, and the
//! dispatch loop.
//!
//! The token can be cloned and shared across tasks. When `request()` is
//! called on any clone, all clones observe it. The dispatch loop checks the
//! marker between calls, so an in-flight call always runs to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A clonable shutdown marker.
///
/// # Example
///
/// ```
/// use echobus::ShutdownToken;
///
/// let token = ShutdownToken::new();
/// let clone = token.clone();
///
/// clone.request();
/// assert!(token.is_requested());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    requested: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    /// Create a new token with shutdown not yet requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown.
    ///
    /// All clones of this token will observe the request; tasks parked in
    /// [`wait`](Self::wait) are woken.
    pub fn request(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Check whether shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Wait until shutdown is requested. Returns immediately if it already
    /// was.
    pub async fn wait(&self) {
        while !self.is_requested() {
            let notified = self.inner.notify.notified();
            // Re-check after arming the waiter so a request() between the
            // loop condition and notified() is not lost.
            if self.is_requested() {
                break;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_visible_across_clones() {
        let token = ShutdownToken::new();
        let clone = token.clone();
        assert!(!token.is_requested());

        clone.request();
        assert!(token.is_requested());
        assert!(clone.is_requested());
    }

    #[tokio::test]
    async fn test_wait_returns_after_request() {
        let token = ShutdownToken::new();
        let waiter = token.clone();

        let handle = tokio::spawn(async move { waiter.wait().await });
        tokio::task::yield_now().await;
        token.request();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_requested() {
        let token = ShutdownToken::new();
        token.request();
        token.wait().await;
    }
}
