//! Stream printer implementation - the pull/emit/commit control loop.
//!
//! Every iteration owns exactly one transaction. A record is handed to the
//! sink before its transaction commits, so a failed commit re-pulls and
//! re-emits the same record: output is at-least-once.

use std::sync::Arc;
use std::time::Duration;

use crate::context::Context;
use crate::domain::Signal;
use crate::error::{Result, StreamPrintError};
use crate::sink::Sink;
use crate::storage::{Storage, Transaction};
use crate::stream::RecordStream;

/// Configuration for the StreamPrinter.
#[derive(Debug, Clone, Default)]
pub struct StreamPrinterConfig {
    /// Pause before restarting an iteration after a failed commit
    pub commit_retry_delay: Duration,
}

/// Counters accumulated across `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrinterStats {
    /// Sink invocations, including duplicates after failed commits
    pub records_emitted: u64,
    /// Commits that failed and restarted their iteration
    pub commit_failures: u64,
    /// Pulls answered with `TransactionExpired`
    pub transactions_expired: u64,
    /// Blocking waits for new data
    pub waits: u64,
}

/// StreamPrinter drains a record stream into a sink.
///
/// Each iteration:
/// 1. Begins a transaction
/// 2. Pulls the next signal, passing the transaction to the stream
/// 3. Emits a record, or handles end-of-stream / expiry / wait
/// 4. Commits; a failed commit restarts from step 1
pub struct StreamPrinter<S, R, K>
where
    S: Storage,
    R: RecordStream,
    K: Sink,
{
    /// Storage the stream keeps its state in
    storage: Arc<S>,
    /// Upstream record source
    stream: R,
    /// Per-record output
    sink: K,
    config: StreamPrinterConfig,
    stats: PrinterStats,
}

impl<S, R, K> StreamPrinter<S, R, K>
where
    S: Storage,
    R: RecordStream,
    K: Sink,
{
    /// Create a new StreamPrinter with the given collaborators.
    pub fn new(storage: Arc<S>, stream: R, sink: K) -> Self {
        Self::with_config(storage, stream, sink, StreamPrinterConfig::default())
    }

    /// Create a new StreamPrinter with custom configuration.
    pub fn with_config(storage: Arc<S>, stream: R, sink: K, config: StreamPrinterConfig) -> Self {
        Self {
            storage,
            stream,
            sink,
            config,
            stats: PrinterStats::default(),
        }
    }

    pub fn stats(&self) -> PrinterStats {
        self.stats
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Consume the printer, returning its sink.
    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Run until end of stream, a hard stream error, or cancellation.
    ///
    /// Cancellation is a clean exit. The only error returned is a hard error
    /// from the stream, wrapped in `StreamPrintError::Pull`.
    pub async fn run(&mut self, ctx: &Context) -> Result<()> {
        loop {
            if ctx.is_cancelled() {
                tracing::debug!("stream printer cancelled");
                return Ok(());
            }

            let mut tx = self.storage.begin_transaction();

            let pulled = tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    tracing::debug!("stream printer cancelled during pull");
                    return Ok(());
                }
                pulled = self.stream.next(ctx, &mut tx) => pulled,
            };

            let signal = match pulled {
                Ok(signal) => signal,
                Err(StreamPrintError::Cancelled) => {
                    tracing::debug!("stream reported cancellation");
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!(error = %e, "couldn't get next record");
                    return Err(StreamPrintError::Pull(Box::new(e)));
                }
            };

            tracing::trace!(signal = signal.kind(), "pulled");

            match signal {
                Signal::Record(record) => {
                    self.sink.emit(&record);
                    self.stats.records_emitted += 1;

                    if let Err(e) = tx.commit() {
                        self.commit_failed(
                            ctx,
                            e,
                            "error committing output print transaction (this can lead to duplicate output records)",
                        )
                        .await;
                    }
                }
                Signal::EndOfStream => match tx.commit() {
                    Ok(()) => {
                        tracing::info!(
                            records = self.stats.records_emitted,
                            commit_failures = self.stats.commit_failures,
                            "stream finished"
                        );
                        return Ok(());
                    }
                    Err(e) => {
                        self.commit_failed(ctx, e, "error committing end of stream").await;
                    }
                },
                Signal::TransactionExpired => {
                    self.stats.transactions_expired += 1;
                    match tx.commit() {
                        // Nothing was consumed, so give other tasks a turn before retrying.
                        Ok(()) => tokio::task::yield_now().await,
                        Err(e) => {
                            self.commit_failed(ctx, e, "error committing expired transaction").await;
                        }
                    }
                }
                Signal::AwaitChanges(mut guard) => {
                    // Never hold a transaction across the wait.
                    if let Err(e) = tx.commit() {
                        drop(guard);
                        self.commit_failed(ctx, e, "error committing before waiting for changes")
                            .await;
                        continue;
                    }

                    self.stats.waits += 1;
                    let blocked = tokio::select! {
                        biased;
                        _ = ctx.cancelled() => Err(StreamPrintError::Cancelled),
                        blocked = guard.block(ctx) => blocked,
                    };

                    let cancelled = matches!(blocked, Err(StreamPrintError::Cancelled));
                    if let Err(e) = blocked
                        && !cancelled
                    {
                        tracing::warn!(error = %e, "couldn't listen for changes");
                    }
                    if let Err(e) = guard.release() {
                        tracing::warn!(error = %e, "couldn't close subscription");
                    }

                    if cancelled || ctx.is_cancelled() {
                        tracing::debug!("stream printer cancelled while waiting for changes");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn commit_failed(&mut self, ctx: &Context, err: StreamPrintError, message: &str) {
        self.stats.commit_failures += 1;
        tracing::warn!(error = %err, "{}", message);

        let delay = self.config.commit_retry_delay;
        if delay.is_zero() {
            tokio::task::yield_now().await;
            return;
        }
        tokio::select! {
            biased;
            _ = ctx.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
