//! Outcome of one pull against a record stream.

use super::record::Record;
use crate::wait::WaitGuard;

/// What the stream produced for one pull attempt.
///
/// Hard failures travel as the `Err` side of the pull's `Result`; every
/// variant here is a protocol instruction to the consumption loop.
#[derive(Debug)]
pub enum Signal {
    /// The next record, in stream order.
    Record(Record),
    /// The stream is permanently exhausted.
    EndOfStream,
    /// No record was returned; the transaction must be replaced before the
    /// stream can make progress.
    TransactionExpired,
    /// No record is available yet; wait on the guard for new data.
    AwaitChanges(WaitGuard),
}

impl Signal {
    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Record(_) => "record",
            Signal::EndOfStream => "end_of_stream",
            Signal::TransactionExpired => "transaction_expired",
            Signal::AwaitChanges(_) => "await_changes",
        }
    }
}
