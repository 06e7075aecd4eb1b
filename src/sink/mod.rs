//! Output sinks - the per-record side effect of the printer.
//!
//! A sink never fails the consumption loop. Encoding and write failures are
//! reported through the sink's own error channel and swallowed.

mod encoding;

use crate::domain::Record;

pub use encoding::{EncodingSink, ErrorReporter, OutputFormat};

/// Pluggable per-record output.
pub trait Sink: Send {
    /// Emit one record. Called with the iteration's transaction still open.
    fn emit(&mut self, record: &Record);
}

impl<F> Sink for F
where
    F: FnMut(&Record) + Send,
{
    fn emit(&mut self, record: &Record) {
        self(record)
    }
}
