//! Domain types for streamprint
//!
//! - Record / Field: one immutable result row with uniquely named fields
//! - Value: the typed value domain records carry
//! - Signal: the discriminated outcome of a single stream pull

pub mod record;
pub mod signal;
pub mod value;

pub use record::{Field, Record};
pub use signal::Signal;
pub use value::Value;
