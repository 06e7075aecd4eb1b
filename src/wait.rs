//! Wait handles: "block until new data may exist" subscriptions.
//!
//! Handles are always held through a [`WaitGuard`], which releases the
//! underlying subscription exactly once on every exit path.

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;

/// A pending subscription to storage changes.
#[async_trait]
pub trait WaitHandle: Send {
    /// Block until changes may exist.
    ///
    /// Returns `Err(StreamPrintError::Cancelled)` if `ctx` is cancelled first.
    async fn block(&mut self, ctx: &Context) -> Result<()>;

    /// Release the subscription. Called at most once by [`WaitGuard`].
    fn release(&mut self) -> Result<()>;
}

/// Scoped owner of a [`WaitHandle`].
pub struct WaitGuard {
    handle: Option<Box<dyn WaitHandle>>,
}

impl std::fmt::Debug for WaitGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitGuard")
            .field("released", &self.handle.is_none())
            .finish()
    }
}

impl WaitGuard {
    /// Take ownership of a wait handle.
    pub fn new(handle: impl WaitHandle + 'static) -> Self {
        Self {
            handle: Some(Box::new(handle)),
        }
    }

    /// Block on the underlying handle.
    pub async fn block(&mut self, ctx: &Context) -> Result<()> {
        match self.handle.as_mut() {
            Some(handle) => handle.block(ctx).await,
            None => Ok(()),
        }
    }

    /// Release explicitly, surfacing the release error to the caller.
    pub fn release(mut self) -> Result<()> {
        match self.handle.take() {
            Some(mut handle) => handle.release(),
            None => Ok(()),
        }
    }
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if let Some(mut handle) = self.handle.take()
            && let Err(e) = handle.release()
        {
            tracing::warn!(error = %e, "couldn't close subscription");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamPrintError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandle {
        releases: Arc<AtomicUsize>,
        fail_release: bool,
    }

    #[async_trait]
    impl WaitHandle for CountingHandle {
        async fn block(&mut self, ctx: &Context) -> Result<()> {
            if ctx.is_cancelled() {
                return Err(StreamPrintError::Cancelled);
            }
            Ok(())
        }

        fn release(&mut self) -> Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            if self.fail_release {
                Err(StreamPrintError::Storage("already closed".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn guard(fail_release: bool) -> (WaitGuard, Arc<AtomicUsize>) {
        let releases = Arc::new(AtomicUsize::new(0));
        let guard = WaitGuard::new(CountingHandle {
            releases: Arc::clone(&releases),
            fail_release,
        });
        (guard, releases)
    }

    #[test]
    fn test_explicit_release_runs_once() {
        let (guard, releases) = guard(false);
        guard.release().unwrap();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases() {
        let (guard, releases) = guard(false);
        drop(guard);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_error_surfaces() {
        let (guard, releases) = guard(true);
        assert!(guard.release().is_err());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_swallows_release_error() {
        let (guard, releases) = guard(true);
        drop(guard);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_block_then_release() {
        let (mut guard, releases) = guard(false);
        guard.block(&Context::background()).await.unwrap();
        assert_eq!(releases.load(Ordering::SeqCst), 0);
        guard.release().unwrap();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_block_cancelled_still_releases_on_drop() {
        let (ctx, handle) = Context::new();
        handle.cancel();
        let (mut guard, releases) = guard(false);
        let result = guard.block(&ctx).await;
        assert!(matches!(result, Err(StreamPrintError::Cancelled)));
        drop(guard);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
