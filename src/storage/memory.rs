//! In-process multi-version storage with optimistic commits.
//!
//! Each transaction reads a snapshot taken when it began, overlaid with its
//! own buffered writes. Commits are first-committer-wins on written keys and
//! publish the new version so subscribers blocked on "no data yet" wake up.

use std::collections::BTreeMap;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;

use super::traits::{Storage, Transaction};
use crate::context::Context;
use crate::error::{Result, StreamPrintError};
use crate::wait::{WaitGuard, WaitHandle};

/// Limits after which a transaction refuses further reads.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorageConfig {
    /// Reads allowed per transaction before `TransactionTooOld`
    pub max_reads_per_transaction: Option<usize>,
    /// Age after which a transaction refuses reads
    pub max_transaction_age: Option<Duration>,
}

impl MemoryStorageConfig {
    /// Reject limits under which no transaction can finish `reads_needed` reads.
    pub fn validate(&self, reads_needed: usize) -> Result<()> {
        if let Some(max_reads) = self.max_reads_per_transaction
            && max_reads < reads_needed
        {
            return Err(StreamPrintError::InvalidConfig(format!(
                "max_reads_per_transaction is {} but a pull needs {} reads",
                max_reads, reads_needed
            )));
        }
        if self.max_transaction_age.is_some_and(|age| age.is_zero()) {
            return Err(StreamPrintError::InvalidConfig(
                "max_transaction_age must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Version {
    at: u64,
    value: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct State {
    version: u64,
    data: BTreeMap<Vec<u8>, Vec<Version>>,
    /// Live snapshot versions and how many transactions hold each.
    snapshots: BTreeMap<u64, usize>,
}

impl State {
    fn read(&self, key: &[u8], snapshot: u64) -> Option<Vec<u8>> {
        self.data
            .get(key)?
            .iter()
            .rev()
            .find(|v| v.at <= snapshot)
            .and_then(|v| v.value.clone())
    }

    fn latest_version(&self, key: &[u8]) -> Option<u64> {
        self.data.get(key).and_then(|versions| versions.last()).map(|v| v.at)
    }

    /// Drop versions no live snapshot can see.
    fn compact(&mut self, key: &[u8]) {
        let horizon = self.snapshots.keys().next().copied().unwrap_or(self.version);
        let Some(versions) = self.data.get_mut(key) else {
            return;
        };
        if let Some(keep_from) = versions.iter().rposition(|v| v.at <= horizon) {
            versions.drain(..keep_from);
        }
        if versions.len() == 1 && versions[0].value.is_none() && versions[0].at <= horizon {
            self.data.remove(key);
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    commits: watch::Sender<u64>,
    subscriptions: AtomicUsize,
    config: MemoryStorageConfig,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| StreamPrintError::Storage(e.to_string()))
    }

    /// Lock for bookkeeping paths that cannot report errors.
    fn lock_recover(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Shared handle to an in-memory store. Cloning shares the same data.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    shared: Arc<Shared>,
}

impl MemoryStorage {
    /// Create an empty store with no transaction limits.
    pub fn new() -> Self {
        Self::with_config(MemoryStorageConfig::default())
    }

    /// Create an empty store with the given limits.
    pub fn with_config(config: MemoryStorageConfig) -> Self {
        let (commits, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                commits,
                subscriptions: AtomicUsize::new(0),
                config,
            }),
        }
    }

    /// Latest committed version.
    pub fn version(&self) -> u64 {
        self.shared.lock_recover().version
    }

    /// Transactions begun and not yet dropped.
    pub fn active_transactions(&self) -> usize {
        self.shared.lock_recover().snapshots.values().sum()
    }

    /// Subscriptions handed out and not yet released.
    pub fn active_subscriptions(&self) -> usize {
        self.shared.subscriptions.load(Ordering::SeqCst)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    type Transaction = MemoryTransaction;

    fn begin_transaction(&self) -> MemoryTransaction {
        let snapshot = {
            let mut state = self.shared.lock_recover();
            let snapshot = state.version;
            *state.snapshots.entry(snapshot).or_insert(0) += 1;
            snapshot
        };
        MemoryTransaction {
            shared: Arc::clone(&self.shared),
            snapshot,
            writes: BTreeMap::new(),
            reads: 0,
            started: Instant::now(),
        }
    }
}

/// Transaction over a [`MemoryStorage`] snapshot.
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    snapshot: u64,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    reads: usize,
    started: Instant,
}

impl MemoryTransaction {
    /// Version this transaction reads at.
    pub fn snapshot(&self) -> u64 {
        self.snapshot
    }

    fn check_expired(&self) -> Result<()> {
        let config = &self.shared.config;
        if let Some(max_reads) = config.max_reads_per_transaction
            && self.reads >= max_reads
        {
            return Err(StreamPrintError::TransactionTooOld);
        }
        if let Some(max_age) = config.max_transaction_age
            && self.started.elapsed() >= max_age
        {
            return Err(StreamPrintError::TransactionTooOld);
        }
        Ok(())
    }
}

impl Transaction for MemoryTransaction {
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_expired()?;
        self.reads += 1;

        if let Some(pending) = self.writes.get(key) {
            return Ok(pending.clone());
        }
        Ok(self.shared.lock()?.read(key, self.snapshot))
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.writes.insert(key.to_vec(), Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    fn subscribe(&self) -> Result<WaitGuard> {
        self.shared.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(WaitGuard::new(MemorySubscription {
            changes: self.shared.commits.subscribe(),
            since: self.snapshot,
            shared: Arc::clone(&self.shared),
            released: false,
        }))
    }

    fn commit(mut self) -> Result<()> {
        let writes = mem::take(&mut self.writes);
        if writes.is_empty() {
            return Ok(());
        }

        let committed = {
            let mut state = self.shared.lock()?;
            for key in writes.keys() {
                if state.latest_version(key).is_some_and(|at| at > self.snapshot) {
                    return Err(StreamPrintError::CommitConflict(
                        String::from_utf8_lossy(key).into_owned(),
                    ));
                }
            }

            state.version += 1;
            let at = state.version;
            for (key, value) in writes {
                state
                    .data
                    .entry(key.clone())
                    .or_default()
                    .push(Version { at, value });
                state.compact(&key);
            }
            at
        };

        self.shared.commits.send_replace(committed);
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        let mut state = self.shared.lock_recover();
        if let Some(count) = state.snapshots.get_mut(&self.snapshot) {
            *count -= 1;
            if *count == 0 {
                state.snapshots.remove(&self.snapshot);
            }
        }
    }
}

/// Resolves once a version newer than `since` has been committed.
struct MemorySubscription {
    changes: watch::Receiver<u64>,
    since: u64,
    shared: Arc<Shared>,
    released: bool,
}

#[async_trait]
impl WaitHandle for MemorySubscription {
    async fn block(&mut self, ctx: &Context) -> Result<()> {
        if self.released {
            return Err(StreamPrintError::Storage(
                "subscription already released".to_string(),
            ));
        }

        let since = self.since;
        let changes = &mut self.changes;
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(StreamPrintError::Cancelled),
            changed = async move { changes.wait_for(|version| *version > since).await.map(|_| ()) } => {
                changed.map_err(|_| StreamPrintError::Storage("storage closed".to_string()))
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            self.shared.subscriptions.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
