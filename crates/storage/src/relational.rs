//! In-memory relational engine
//!
//! Rows keep a chain of committed versions stamped with a global commit
//! sequence, which is what snapshot reads resolve against. When a row is
//! written, versions that no open snapshot can see any more are dropped, so a
//! chain only grows while a snapshot older than it is still open.
//!
//! ## Isolation
//!
//! | Level | Reads | Writing a row another txn committed after our snapshot |
//! |-------|-------|------------------------------------------------------|
//! | ReadCommitted | latest committed | allowed (last writer wins) |
//! | RepeatableRead | begin-time snapshot | `SerializationFailure` |
//! | Serializable | begin-time snapshot | `SerializationFailure` |
//!
//! At every level a write takes a row lock held until commit or rollback. A
//! second writer waits for the lock; once released it re-checks the row under
//! its own isolation rules. This is first-updater-wins: of two snapshot
//! transactions that update the same row, the later one aborts.
//!
//! ```text
//! T1: begin ── read v1 ── update (lock) ── commit ─┐
//! T2: begin ── read v1 ────────── update ──────────┴─ wait ── SerializationFailure
//! ```

use crate::error::{StorageError, StorageResult};
use crate::row::{Datum, Row, RowFilter};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use steadfast_core::IsolationLevel;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Transaction identifier, unique per engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(u64);

impl TxnId {
    /// Raw identifier
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// One committed image of a row
#[derive(Debug, Clone)]
struct CommittedVersion {
    seq: u64,
    row: Row,
}

#[derive(Debug, Default)]
struct StoredRow {
    /// Ascending by `seq`
    history: Vec<CommittedVersion>,
    lock_owner: Option<TxnId>,
}

impl StoredRow {
    fn latest(&self) -> Option<&CommittedVersion> {
        self.history.last()
    }

    fn visible_at(&self, snapshot: u64) -> Option<&Row> {
        self.history
            .iter()
            .rev()
            .find(|v| v.seq <= snapshot)
            .map(|v| &v.row)
    }

    fn latest_row(&self) -> Option<&Row> {
        self.latest().map(|v| &v.row)
    }

    /// Drop versions older than the one visible at `horizon`
    fn prune(&mut self, horizon: u64) {
        if let Some(keep) = self.history.iter().rposition(|v| v.seq <= horizon) {
            self.history.drain(..keep);
        }
    }
}

#[derive(Debug)]
struct Table {
    primary_key: String,
    rows: BTreeMap<String, StoredRow>,
}

#[derive(Debug, Default)]
struct EngineState {
    tables: HashMap<String, Table>,
    /// Sequence of the most recent commit
    commit_seq: u64,
    /// Lock waits in progress: waiter -> holder
    waits_for: HashMap<TxnId, TxnId>,
    /// Snapshots of open repeatable-read / serializable transactions, with counts
    open_snapshots: BTreeMap<u64, usize>,
}

impl EngineState {
    fn table(&self, name: &str) -> StorageResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| StorageError::UndefinedTable(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> StorageResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StorageError::UndefinedTable(name.to_string()))
    }

    fn open_snapshot(&mut self, snapshot: u64) {
        *self.open_snapshots.entry(snapshot).or_insert(0) += 1;
    }

    fn close_snapshot(&mut self, snapshot: u64) {
        if let Some(count) = self.open_snapshots.get_mut(&snapshot) {
            *count -= 1;
            if *count == 0 {
                self.open_snapshots.remove(&snapshot);
            }
        }
    }

    /// Oldest commit sequence any open transaction may still read
    fn horizon(&self) -> u64 {
        self.open_snapshots
            .keys()
            .next()
            .copied()
            .unwrap_or(self.commit_seq)
    }

    /// True if `holder` is (transitively) waiting on `waiter`
    fn would_deadlock(&self, waiter: TxnId, holder: TxnId) -> bool {
        let mut current = holder;
        for _ in 0..=self.waits_for.len() {
            match self.waits_for.get(&current) {
                Some(&next) if next == waiter => return true,
                Some(&next) => current = next,
                None => return false,
            }
        }
        false
    }
}

struct Shared {
    state: Mutex<EngineState>,
    /// Signalled whenever a transaction releases its row locks
    released: Notify,
    next_txn_id: AtomicU64,
}

/// In-memory relational engine
///
/// Cloning is cheap; clones share the same data.
#[derive(Clone)]
pub struct RelationalEngine {
    shared: Arc<Shared>,
}

impl RelationalEngine {
    /// Create an empty engine
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState::default()),
                released: Notify::new(),
                next_txn_id: AtomicU64::new(1),
            }),
        }
    }

    /// Drop `name` if present and create it empty (`DROP TABLE; CREATE TABLE`)
    pub fn reset_table(&self, name: &str, primary_key: &str) {
        let mut state = self.shared.state.lock();
        state.tables.insert(
            name.to_string(),
            Table {
                primary_key: primary_key.to_string(),
                rows: BTreeMap::new(),
            },
        );
        debug!(table = name, primary_key, "table reset");
    }

    /// Insert a row outside any transaction
    pub fn insert_row(&self, table: &str, row: Row) -> StorageResult<()> {
        let mut state = self.shared.state.lock();
        let seq = state.commit_seq + 1;
        let t = state.table_mut(table)?;
        let key = row
            .get(&t.primary_key)
            .and_then(Datum::as_text)
            .ok_or_else(|| StorageError::MissingPrimaryKey {
                relation: table.to_string(),
                column: t.primary_key.clone(),
            })?
            .to_string();

        let stored = t.rows.entry(key.clone()).or_default();
        if stored.latest_row().is_some() || stored.lock_owner.is_some() {
            return Err(StorageError::DuplicateKey {
                relation: table.to_string(),
                key,
            });
        }
        stored.history.push(CommittedVersion { seq, row });
        state.commit_seq = seq;
        Ok(())
    }

    /// Latest committed image of a row, outside any transaction
    pub fn fetch_committed(&self, table: &str, key: &str) -> StorageResult<Option<Row>> {
        let state = self.shared.state.lock();
        Ok(state
            .table(table)?
            .rows
            .get(key)
            .and_then(StoredRow::latest_row)
            .cloned())
    }

    /// Sequence number of the most recent commit
    pub fn commit_seq(&self) -> u64 {
        self.shared.state.lock().commit_seq
    }

    /// Start a transaction at `isolation`
    ///
    /// Snapshot levels capture the current commit sequence here, so the
    /// snapshot is as of `begin`, not as of the first statement.
    pub async fn begin(&self, isolation: IsolationLevel) -> RelationalTransaction {
        let id = TxnId(self.shared.next_txn_id.fetch_add(1, Ordering::SeqCst));
        let snapshot = {
            let mut state = self.shared.state.lock();
            let snapshot = state.commit_seq;
            if isolation.uses_snapshot() {
                state.open_snapshot(snapshot);
            }
            snapshot
        };
        debug!(txn = %id, %isolation, snapshot, "transaction started");
        RelationalTransaction {
            id,
            isolation,
            snapshot,
            writes: HashMap::new(),
            status: TxnStatus::Active,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for RelationalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RelationalEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("RelationalEngine")
            .field("tables", &state.tables.len())
            .field("commit_seq", &state.commit_seq)
            .finish()
    }
}

enum UpdateAttempt {
    Done(u64),
    Blocked(TxnId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnStatus {
    Active,
    Committed,
    RolledBack,
}

impl TxnStatus {
    fn name(self) -> &'static str {
        match self {
            TxnStatus::Active => "active",
            TxnStatus::Committed => "committed",
            TxnStatus::RolledBack => "rolled back",
        }
    }
}

/// An open transaction on a [`RelationalEngine`]
///
/// Dropping an active transaction rolls it back.
pub struct RelationalTransaction {
    id: TxnId,
    isolation: IsolationLevel,
    snapshot: u64,
    /// Pending row images keyed by (table, primary key)
    writes: HashMap<(String, String), Row>,
    status: TxnStatus,
    shared: Arc<Shared>,
}

impl RelationalTransaction {
    /// Transaction identifier
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Isolation level requested at `begin`
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// True until commit or rollback
    pub fn is_active(&self) -> bool {
        self.status == TxnStatus::Active
    }

    fn ensure_active(&self) -> StorageResult<()> {
        match self.status {
            TxnStatus::Active => Ok(()),
            other => Err(StorageError::TransactionClosed(other.name())),
        }
    }

    /// `SELECT * FROM table WHERE pk = key`
    pub async fn fetch_row(&self, table: &str, key: &str) -> StorageResult<Option<Row>> {
        self.ensure_active()?;
        if let Some(own) = self.writes.get(&(table.to_string(), key.to_string())) {
            return Ok(Some(own.clone()));
        }

        let state = self.shared.state.lock();
        let stored = state.table(table)?.rows.get(key);
        let row = match (stored, self.isolation.uses_snapshot()) {
            (Some(stored), true) => stored.visible_at(self.snapshot).cloned(),
            (Some(stored), false) => stored.latest_row().cloned(),
            (None, _) => None,
        };
        trace!(txn = %self.id, table, key, found = row.is_some(), "fetch_row");
        Ok(row)
    }

    /// `UPDATE table SET assignments WHERE filter`, returns rows affected (0 or 1)
    ///
    /// Waits while another transaction holds the row lock.
    pub async fn execute_update(
        &mut self,
        table: &str,
        filter: &RowFilter,
        assignments: &Row,
    ) -> StorageResult<u64> {
        self.ensure_active()?;
        let shared = Arc::clone(&self.shared);
        loop {
            // Registered before inspecting the lock so a release between the
            // check and the await is not missed.
            let released = shared.released.notified();
            match self.try_update(table, filter, assignments)? {
                UpdateAttempt::Done(affected) => return Ok(affected),
                UpdateAttempt::Blocked(holder) => {
                    debug!(txn = %self.id, %holder, table, key = filter.primary_key(), "waiting for row lock");
                    released.await;
                }
            }
        }
    }

    fn try_update(
        &mut self,
        table: &str,
        filter: &RowFilter,
        assignments: &Row,
    ) -> StorageResult<UpdateAttempt> {
        let key = filter.primary_key().to_string();
        let write_key = (table.to_string(), key.clone());
        let mut state = self.shared.state.lock();
        let t = state.table_mut(table)?;
        let Some(stored) = t.rows.get_mut(&key) else {
            return Ok(UpdateAttempt::Done(0));
        };

        if let Some(holder) = stored.lock_owner.filter(|owner| *owner != self.id) {
            if state.would_deadlock(self.id, holder) {
                state.waits_for.remove(&self.id);
                return Err(StorageError::DeadlockDetected {
                    waiter: self.id.as_u64(),
                    holder: holder.as_u64(),
                });
            }
            state.waits_for.insert(self.id, holder);
            return Ok(UpdateAttempt::Blocked(holder));
        }

        let image = if let Some(own) = self.writes.get(&write_key) {
            Some(own.clone())
        } else if self.isolation.uses_snapshot() {
            let visible = stored.visible_at(self.snapshot).cloned();
            let concurrently_modified = stored
                .latest()
                .map(|v| v.seq > self.snapshot)
                .unwrap_or(false);
            if concurrently_modified && visible.as_ref().map(|r| filter.matches(r)).unwrap_or(false) {
                state.waits_for.remove(&self.id);
                debug!(txn = %self.id, table, key = %key, "serialization failure");
                return Err(StorageError::SerializationFailure {
                    relation: table.to_string(),
                    key,
                });
            }
            visible
        } else {
            stored.latest_row().cloned()
        };

        let Some(mut row) = image.filter(|r| filter.matches(r)) else {
            state.waits_for.remove(&self.id);
            return Ok(UpdateAttempt::Done(0));
        };

        row.apply(assignments);
        stored.lock_owner = Some(self.id);
        state.waits_for.remove(&self.id);
        self.writes.insert(write_key, row);
        trace!(txn = %self.id, table, key = %key, "row updated");
        Ok(UpdateAttempt::Done(1))
    }

    /// Publish pending writes and release row locks
    pub async fn commit(&mut self) -> StorageResult<()> {
        self.ensure_active()?;
        {
            let mut state = self.shared.state.lock();
            let seq = state.commit_seq + 1;
            let written = self.writes.len();
            let mut touched = Vec::with_capacity(written);
            for ((table, key), row) in self.writes.drain() {
                let t = state.table_mut(&table)?;
                let stored = t.rows.entry(key.clone()).or_default();
                stored.history.push(CommittedVersion { seq, row });
                stored.lock_owner = None;
                touched.push((table, key));
            }
            if written > 0 {
                state.commit_seq = seq;
            }
            if self.isolation.uses_snapshot() {
                state.close_snapshot(self.snapshot);
            }
            let horizon = state.horizon();
            for (table, key) in &touched {
                if let Some(stored) = state.tables.get_mut(table).and_then(|t| t.rows.get_mut(key)) {
                    stored.prune(horizon);
                }
            }
            state.waits_for.remove(&self.id);
            debug!(txn = %self.id, seq, written, "transaction committed");
        }
        self.status = TxnStatus::Committed;
        self.shared.released.notify_waiters();
        Ok(())
    }

    /// Discard pending writes and release row locks
    pub async fn rollback(&mut self) -> StorageResult<()> {
        self.ensure_active()?;
        self.release();
        Ok(())
    }

    fn release(&mut self) {
        {
            let mut state = self.shared.state.lock();
            for (table, key) in self.writes.keys() {
                if let Some(stored) = state
                    .tables
                    .get_mut(table)
                    .and_then(|t| t.rows.get_mut(key))
                {
                    if stored.lock_owner == Some(self.id) {
                        stored.lock_owner = None;
                    }
                }
            }
            state.waits_for.remove(&self.id);
            if self.isolation.uses_snapshot() {
                state.close_snapshot(self.snapshot);
            }
        }
        let discarded = self.writes.len();
        self.writes.clear();
        self.status = TxnStatus::RolledBack;
        self.shared.released.notify_waiters();
        debug!(txn = %self.id, discarded, "transaction rolled back");
    }
}

impl Drop for RelationalTransaction {
    fn drop(&mut self) {
        if self.status == TxnStatus::Active {
            self.release();
        }
    }
}

impl fmt::Debug for RelationalTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalTransaction")
            .field("id", &self.id)
            .field("isolation", &self.isolation)
            .field("snapshot", &self.snapshot)
            .field("pending", &self.writes.len())
            .field("status", &self.status)
            .finish()
    }
}
