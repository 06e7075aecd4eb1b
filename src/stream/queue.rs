//! A named record queue kept entirely in transactional storage.
//!
//! Layout under the queue name:
//! - `<queue>/len`: number of records ever pushed
//! - `<queue>/closed`: set once no more records will arrive
//! - `<queue>/cursor`: index of the next record to consume
//! - `<queue>/item/<index>`: the encoded record, removed once consumed

use async_trait::async_trait;

use super::RecordStream;
use crate::context::Context;
use crate::domain::{Record, Signal};
use crate::error::{Result, StreamPrintError};
use crate::storage::{Transaction, TransactionExt};

#[derive(Debug, Clone)]
struct QueueKeys {
    len: Vec<u8>,
    closed: Vec<u8>,
    cursor: Vec<u8>,
    item_prefix: String,
}

impl QueueKeys {
    fn new(name: &str) -> Self {
        Self {
            len: format!("{}/len", name).into_bytes(),
            closed: format!("{}/closed", name).into_bytes(),
            cursor: format!("{}/cursor", name).into_bytes(),
            item_prefix: format!("{}/item/", name),
        }
    }

    fn item(&self, index: u64) -> Vec<u8> {
        format!("{}{:020}", self.item_prefix, index).into_bytes()
    }

    fn len(&self, tx: &mut dyn Transaction) -> Result<u64> {
        Ok(tx.get_json(&self.len)?.unwrap_or(0))
    }

    fn closed(&self, tx: &mut dyn Transaction) -> Result<bool> {
        Ok(tx.get_json(&self.closed)?.unwrap_or(false))
    }
}

/// Consumer side of a storage-backed queue.
#[derive(Debug, Clone)]
pub struct QueueStream {
    name: String,
    keys: QueueKeys,
}

impl QueueStream {
    /// Storage reads one pull performs: cursor, length, then item or closed flag.
    pub const READS_PER_PULL: usize = 3;

    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let keys = QueueKeys::new(&name);
        Self { name, keys }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn pull(&self, tx: &mut dyn Transaction) -> Result<Signal> {
        let cursor: u64 = tx.get_json(&self.keys.cursor)?.unwrap_or(0);
        let len = self.keys.len(tx)?;

        if cursor < len {
            let bytes = tx.get(&self.keys.item(cursor))?.ok_or_else(|| {
                StreamPrintError::Stream(format!("queue {} is missing item {}", self.name, cursor))
            })?;
            let record: Record = serde_json::from_slice(&bytes)?;
            tx.delete(&self.keys.item(cursor))?;
            tx.set_json(&self.keys.cursor, &(cursor + 1))?;
            return Ok(Signal::Record(record));
        }

        if self.keys.closed(tx)? {
            return Ok(Signal::EndOfStream);
        }

        Ok(Signal::AwaitChanges(tx.subscribe()?))
    }
}

#[async_trait]
impl RecordStream for QueueStream {
    async fn next(&mut self, ctx: &Context, tx: &mut dyn Transaction) -> Result<Signal> {
        if ctx.is_cancelled() {
            return Err(StreamPrintError::Cancelled);
        }

        match self.pull(tx) {
            Err(StreamPrintError::TransactionTooOld) => Ok(Signal::TransactionExpired),
            other => other,
        }
    }
}

/// Producer side of a storage-backed queue.
#[derive(Debug, Clone)]
pub struct QueueWriter {
    name: String,
    keys: QueueKeys,
}

impl QueueWriter {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let keys = QueueKeys::new(&name);
        Self { name, keys }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a record. Visible to consumers once `tx` commits.
    pub fn push(&self, tx: &mut dyn Transaction, record: &Record) -> Result<()> {
        if self.keys.closed(tx)? {
            return Err(StreamPrintError::Stream(format!(
                "queue {} is closed",
                self.name
            )));
        }
        let len = self.keys.len(tx)?;
        tx.set(&self.keys.item(len), serde_json::to_vec(record)?)?;
        tx.set_json(&self.keys.len, &(len + 1))
    }

    /// Mark the queue as finished.
    pub fn close(&self, tx: &mut dyn Transaction) -> Result<()> {
        tx.set_json(&self.keys.closed, &true)
    }
}
