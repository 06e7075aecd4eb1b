//! Record streams consumed by the printer.
//!
//! A stream is pulled once per loop iteration with the iteration's
//! transaction passed explicitly; it persists its own progress through that
//! transaction and answers with a [`Signal`].

mod feed;
mod queue;

use async_trait::async_trait;

use crate::context::Context;
use crate::domain::Signal;
use crate::error::Result;
use crate::storage::Transaction;

pub use feed::{FeedSummary, LineFeeder};
pub use queue::{QueueStream, QueueWriter};

/// A possibly-unbounded ordered source of records.
#[async_trait]
pub trait RecordStream: Send {
    /// Pull the next outcome.
    ///
    /// Any `Err` other than `StreamPrintError::Cancelled` is a hard error that
    /// terminates the consumer.
    async fn next(&mut self, ctx: &Context, tx: &mut dyn Transaction) -> Result<Signal>;
}
