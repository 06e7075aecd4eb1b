//! Cooperative cancellation for the consumption loop.
//!
//! A [`Context`] is checked at suspension points (the pull and the change
//! wait), never used to interrupt work that is already running.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Cloneable cancellation context with an optional deadline.
#[derive(Debug, Clone)]
pub struct Context {
    cancel_rx: watch::Receiver<bool>,
    /// Keeps the channel open for contexts that have no external handle.
    keepalive: Option<Arc<watch::Sender<bool>>>,
    deadline: Option<Instant>,
}

/// Cancels every [`Context`] derived from the same root.
#[derive(Debug)]
pub struct CancelHandle {
    cancel_tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel the associated contexts. Idempotent.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Whether `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }
}

impl Context {
    /// Create a cancellable root context and its handle.
    pub fn new() -> (Self, CancelHandle) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let ctx = Self {
            cancel_rx,
            keepalive: None,
            deadline: None,
        };
        (ctx, CancelHandle { cancel_tx })
    }

    /// A context that is never cancelled.
    pub fn background() -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            cancel_rx,
            keepalive: Some(Arc::new(cancel_tx)),
            deadline: None,
        }
    }

    /// Derive a context that is also cancelled once `timeout` elapses.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a context that is also cancelled at `deadline`.
    ///
    /// An earlier deadline inherited from `self` is kept.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            cancel_rx: self.cancel_rx.clone(),
            keepalive: self.keepalive.clone(),
            deadline: Some(deadline),
        }
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Non-blocking cancellation check.
    pub fn is_cancelled(&self) -> bool {
        if *self.cancel_rx.borrow() {
            return true;
        }
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    /// Completes once the context is cancelled or its deadline passes.
    ///
    /// If the cancel handle is dropped without cancelling and there is no
    /// deadline, this never completes.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_rx.clone();
        let signalled = async move {
            let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
            if closed {
                std::future::pending::<()>().await;
            }
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = signalled => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => signalled.await,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_not_cancelled() {
        let (ctx, handle) = Context::new();
        assert!(!ctx.is_cancelled());
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn test_cancel_propagates_to_clones() {
        let (ctx, handle) = Context::new();
        let child = ctx.clone();
        handle.cancel();
        assert!(ctx.is_cancelled());
        assert!(child.is_cancelled());
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_background_never_cancelled() {
        let ctx = Context::background();
        assert!(!ctx.is_cancelled());
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_completes_after_cancel() {
        let (ctx, handle) = Context::new();
        let waiter = tokio::spawn(async move { ctx.cancelled().await });
        tokio::task::yield_now().await;
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() should complete")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_already_cancelled_returns_immediately() {
        let (ctx, handle) = Context::new();
        handle.cancel();
        tokio::time::timeout(Duration::from_millis(100), ctx.cancelled())
            .await
            .expect("cancelled() should complete immediately");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels() {
        let ctx = Context::background().with_timeout(Duration::from_secs(5));
        assert!(!ctx.is_cancelled());
        ctx.cancelled().await;
        assert!(ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_cancelled_is_pending() {
        let ctx = Context::background();
        let result = tokio::time::timeout(Duration::from_secs(60), ctx.cancelled()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_does_not_cancel() {
        let (ctx, handle) = Context::new();
        drop(handle);
        assert!(!ctx.is_cancelled());
        let result = tokio::time::timeout(Duration::from_secs(60), ctx.cancelled()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_with_deadline_keeps_earlier_deadline() {
        let ctx = Context::background();
        let early = Instant::now() + Duration::from_secs(1);
        let late = Instant::now() + Duration::from_secs(10);
        let child = ctx.with_deadline(early).with_deadline(late);
        assert_eq!(child.deadline(), Some(early));
    }
}
