//! Streamprint - transactional streaming record printer
//!
//! Streamprint drains a pull-based record stream into an output sink, one
//! storage transaction per record, with at-least-once output semantics.

pub mod context;
pub mod domain;
pub mod error;
pub mod printer;
pub mod sink;
pub mod storage;
pub mod stream;
pub mod wait;

pub use error::{Result, StreamPrintError};
