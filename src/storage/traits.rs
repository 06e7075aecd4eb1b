//! Storage trait definitions.

use serde::{Serialize, de::DeserializeOwned};

use crate::error::Result;
use crate::wait::WaitGuard;

/// A scoped unit of work against a [`Storage`].
///
/// Writes are buffered until [`Transaction::commit`]. Dropping a transaction
/// without committing discards them.
pub trait Transaction: Send {
    /// Read a key as of this transaction, including its own writes.
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Buffer a write.
    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<()>;

    /// Buffer a delete.
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Subscribe to changes committed after this transaction's snapshot.
    fn subscribe(&self) -> Result<WaitGuard>;

    /// Apply buffered writes atomically.
    fn commit(self) -> Result<()>
    where
        Self: Sized;
}

/// Transactional key/value storage shared by streams and consumers.
pub trait Storage: Send + Sync {
    type Transaction: Transaction;

    /// Open a new transaction.
    fn begin_transaction(&self) -> Self::Transaction;
}

/// JSON helpers over any transaction.
pub trait TransactionExt: Transaction {
    /// Read and decode a JSON value.
    fn get_json<T: DeserializeOwned>(&mut self, key: &[u8]) -> Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Encode and buffer a JSON value.
    fn set_json<T: Serialize + ?Sized>(&mut self, key: &[u8], value: &T) -> Result<()> {
        self.set(key, serde_json::to_vec(value)?)
    }
}

impl<T: Transaction + ?Sized> TransactionExt for T {}
