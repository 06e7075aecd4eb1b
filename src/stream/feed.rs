//! Feeds newline-delimited JSON objects into a storage-backed queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::queue::QueueWriter;
use crate::context::Context;
use crate::domain::Record;
use crate::error::{Result, StreamPrintError};
use crate::storage::{Storage, Transaction};

/// Counts from one feed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    /// Records committed to the queue
    pub pushed: u64,
    /// Lines that were blank or not a JSON object
    pub skipped: u64,
    /// Whether the queue was closed at end of input
    pub closed: bool,
}

/// Producer that pushes one committed transaction per input line.
pub struct LineFeeder<S: Storage> {
    storage: Arc<S>,
    writer: QueueWriter,
    interval: Duration,
}

impl<S: Storage> LineFeeder<S> {
    pub fn new(storage: Arc<S>, writer: QueueWriter) -> Self {
        Self {
            storage,
            writer,
            interval: Duration::ZERO,
        }
    }

    /// Pause between records; zero disables pacing.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Read `reader` to the end, then close the queue.
    ///
    /// Stops early without closing the queue if `ctx` is cancelled.
    pub async fn run<R>(&self, ctx: &Context, reader: R) -> Result<FeedSummary>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut summary = FeedSummary::default();
        let mut line_no = 0u64;

        loop {
            let line = tokio::select! {
                biased;
                _ = ctx.cancelled() => return Ok(summary),
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                break;
            };
            line_no += 1;

            if line.trim().is_empty() {
                summary.skipped += 1;
                continue;
            }

            let record = match serde_json::from_str(&line)
                .map_err(StreamPrintError::from)
                .and_then(Record::from_json)
            {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(line = line_no, error = %e, "skipping invalid input line");
                    summary.skipped += 1;
                    continue;
                }
            };

            let mut tx = self.storage.begin_transaction();
            self.writer.push(&mut tx, &record)?;
            tx.commit()?;
            summary.pushed += 1;

            if !self.interval.is_zero() {
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => return Ok(summary),
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        }

        let mut tx = self.storage.begin_transaction();
        self.writer.close(&mut tx)?;
        tx.commit()?;
        summary.closed = true;

        tracing::debug!(
            queue = %self.writer.name(),
            pushed = summary.pushed,
            skipped = summary.skipped,
            "feed finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Signal, Value};
    use crate::storage::MemoryStorage;
    use crate::stream::{QueueStream, RecordStream};

    async fn drain(storage: &MemoryStorage, name: &str) -> Vec<Record> {
        let mut stream = QueueStream::new(name);
        let mut out = Vec::new();
        loop {
            let mut tx = storage.begin_transaction();
            match stream.next(&Context::background(), &mut tx).await.unwrap() {
                Signal::Record(r) => out.push(r),
                Signal::EndOfStream => break,
                other => panic!("unexpected {:?}", other),
            }
            tx.commit().unwrap();
        }
        out
    }

    #[tokio::test]
    async fn test_feeds_lines_and_closes() {
        let storage = Arc::new(MemoryStorage::new());
        let feeder = LineFeeder::new(Arc::clone(&storage), QueueWriter::new("in"));
        let input = "{\"a\": 1}\n\n{\"a\": 2}\n";

        let summary = feeder.run(&Context::background(), input.as_bytes()).await.unwrap();
        assert_eq!(
            summary,
            FeedSummary {
                pushed: 2,
                skipped: 1,
                closed: true
            }
        );

        let records = drain(&storage, "in").await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].value("a"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn test_invalid_lines_skipped() {
        let storage = Arc::new(MemoryStorage::new());
        let feeder = LineFeeder::new(Arc::clone(&storage), QueueWriter::new("in"));
        let input = "not json\n[1,2]\n{\"ok\": true}\n";

        let summary = feeder.run(&Context::background(), input.as_bytes()).await.unwrap();
        assert_eq!(summary.pushed, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(drain(&storage, "in").await.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_feed_leaves_queue_open() {
        let storage = Arc::new(MemoryStorage::new());
        let feeder = LineFeeder::new(Arc::clone(&storage), QueueWriter::new("in"));
        let (ctx, handle) = Context::new();
        handle.cancel();

        let summary = feeder.run(&ctx, "{\"a\": 1}\n".as_bytes()).await.unwrap();
        assert!(!summary.closed);

        let mut tx = storage.begin_transaction();
        let signal = QueueStream::new("in")
            .next(&Context::background(), &mut tx)
            .await
            .unwrap();
        assert!(!matches!(signal, Signal::EndOfStream));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_paces_records() {
        let storage = Arc::new(MemoryStorage::new());
        let feeder = LineFeeder::new(Arc::clone(&storage), QueueWriter::new("in"))
            .with_interval(Duration::from_secs(1));
        let start = tokio::time::Instant::now();

        feeder
            .run(&Context::background(), "{\"a\": 1}\n{\"a\": 2}\n".as_bytes())
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
