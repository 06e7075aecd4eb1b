//! Stream printer module - the transactional consumption loop.
//!
//! This module provides:
//! - StreamPrinter for draining a RecordStream into a Sink
//! - StreamPrinterConfig for retry pacing
//! - PrinterStats for counters accumulated during a run

mod stream_printer;

pub use stream_printer::{PrinterStats, StreamPrinter, StreamPrinterConfig};
