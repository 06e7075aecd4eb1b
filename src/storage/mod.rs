//! Storage layer for streamprint - transactional key/value state.
//!
//! Streams persist their cursors through a [`Transaction`] handed to them
//! explicitly by the consumer; [`MemoryStorage`] is the in-process engine
//! used by the CLI and tests.

mod memory;
mod traits;

pub use memory::{MemoryStorage, MemoryStorageConfig, MemoryTransaction};
pub use traits::{Storage, Transaction, TransactionExt};
