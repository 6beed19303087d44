//! In-memory document store
//!
//! Documents are JSON objects keyed by a string `_id`. A [`DocumentSession`]
//! may run one multi-statement transaction at a time:
//!
//! - `find_one` sees the latest committed document, or the session's own
//!   uncommitted write if it has one.
//! - `update_one` evaluates its filter atomically. Inside a transaction the new
//!   image stays private to the session and the document is marked with the
//!   session's write intent; another transaction touching a marked document
//!   gets [`StorageError::WriteConflict`].
//! - `commit_transaction` publishes every pending write at once;
//!   `abort_transaction` drops them.
//!
//! The store provides no isolation beyond that. Callers wanting to detect lost
//! updates put a version field in the filter and check `modified_count`.

use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

/// A JSON document
pub type Document = serde_json::Map<String, Value>;

/// Primary key field
pub const ID_FIELD: &str = "_id";

/// Outcome of `update_one`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateResult {
    /// Documents matching the filter (0 or 1)
    pub matched_count: u64,
    /// Documents whose content changed (0 or 1)
    pub modified_count: u64,
}

#[derive(Debug)]
struct StoredDoc {
    doc: Document,
    intent: Option<Uuid>,
}

#[derive(Debug, Default)]
struct Collection {
    docs: BTreeMap<String, StoredDoc>,
}

#[derive(Debug, Default)]
struct StoreState {
    collections: HashMap<String, Collection>,
}

fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(field, value)| doc.get(field) == Some(value))
}

fn doc_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// In-memory document store
///
/// Cloning is cheap; clones share the same data.
#[derive(Clone, Default)]
pub struct DocumentStore {
    state: Arc<Mutex<StoreState>>,
}

impl DocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `name` if it does not exist
    pub fn create_collection(&self, name: &str) {
        self.state
            .lock()
            .collections
            .entry(name.to_string())
            .or_default();
    }

    /// Remove `name` and every document in it
    pub fn drop_collection(&self, name: &str) -> bool {
        let dropped = self.state.lock().collections.remove(name).is_some();
        debug!(collection = name, dropped, "collection dropped");
        dropped
    }

    /// Insert a document outside any transaction
    pub fn insert_one(&self, collection: &str, doc: Document) -> StorageResult<()> {
        let id = doc_id(&doc)
            .ok_or_else(|| StorageError::MissingPrimaryKey {
                relation: collection.to_string(),
                column: ID_FIELD.to_string(),
            })?
            .to_string();

        let mut state = self.state.lock();
        let coll = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| StorageError::UndefinedCollection(collection.to_string()))?;
        if coll.docs.contains_key(&id) {
            return Err(StorageError::DuplicateKey {
                relation: collection.to_string(),
                key: id,
            });
        }
        coll.docs.insert(id, StoredDoc { doc, intent: None });
        Ok(())
    }

    /// Latest committed document with `_id == id`
    pub fn find_committed(&self, collection: &str, id: &str) -> Option<Document> {
        self.state
            .lock()
            .collections
            .get(collection)
            .and_then(|c| c.docs.get(id))
            .map(|stored| stored.doc.clone())
    }

    /// Open a new logical session
    pub async fn start_session(&self) -> DocumentSession {
        let id = Uuid::new_v4();
        trace!(session = %id, "session started");
        DocumentSession {
            id,
            state: Arc::clone(&self.state),
            txn: None,
            txn_number: 0,
        }
    }
}

impl fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStore")
            .field("collections", &self.state.lock().collections.len())
            .finish()
    }
}

#[derive(Debug, Default)]
struct SessionTxn {
    /// Pending images keyed by (collection, _id)
    writes: HashMap<(String, String), Document>,
}

/// A logical session on a [`DocumentStore`]
///
/// Dropping a session with a running transaction aborts it.
pub struct DocumentSession {
    id: Uuid,
    state: Arc<Mutex<StoreState>>,
    txn: Option<SessionTxn>,
    txn_number: u64,
}

impl DocumentSession {
    /// Logical session id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// True while a transaction is running
    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    /// Number of transactions started on this session
    pub fn txn_number(&self) -> u64 {
        self.txn_number
    }

    /// Begin a multi-statement transaction
    pub fn start_transaction(&mut self) -> StorageResult<()> {
        if self.txn.is_some() {
            return Err(StorageError::TransactionInProgress);
        }
        self.txn = Some(SessionTxn::default());
        self.txn_number += 1;
        debug!(session = %self.id, txn_number = self.txn_number, "transaction started");
        Ok(())
    }

    /// First document matching every field of `filter`
    pub async fn find_one(
        &self,
        collection: &str,
        filter: &Document,
    ) -> StorageResult<Option<Document>> {
        let state = self.state.lock();
        let Some(coll) = state.collections.get(collection) else {
            return Ok(None);
        };
        let found = self
            .candidates(collection, coll, filter)
            .find(|(_, image)| matches(image, filter))
            .map(|(_, image)| image.clone());
        trace!(session = %self.id, collection, found = found.is_some(), "find_one");
        Ok(found)
    }

    /// Apply `$set: set` to the first document matching `filter`
    pub async fn update_one(
        &mut self,
        collection: &str,
        filter: &Document,
        set: &Document,
    ) -> StorageResult<UpdateResult> {
        if set.contains_key(ID_FIELD) {
            return Err(StorageError::ImmutableField(ID_FIELD.to_string()));
        }

        let mut state = self.state.lock();
        let Some(coll) = state.collections.get_mut(collection) else {
            return Ok(UpdateResult::default());
        };

        let target = self
            .candidates(collection, coll, filter)
            .find(|(_, image)| matches(image, filter))
            .map(|(id, image)| (id.to_string(), image.clone()));
        let Some((id, image)) = target else {
            trace!(session = %self.id, collection, "update_one matched nothing");
            return Ok(UpdateResult::default());
        };

        let stored = coll
            .docs
            .get_mut(&id)
            .ok_or_else(|| StorageError::UndefinedCollection(collection.to_string()))?;
        if stored.intent.is_some_and(|owner| owner != self.id) {
            debug!(session = %self.id, collection, id = %id, "write conflict");
            return Err(StorageError::WriteConflict {
                collection: collection.to_string(),
                id,
            });
        }

        let mut updated = image.clone();
        for (field, value) in set {
            updated.insert(field.clone(), value.clone());
        }
        let modified = u64::from(updated != image);

        match self.txn.as_mut() {
            Some(txn) => {
                stored.intent = Some(self.id);
                txn.writes.insert((collection.to_string(), id), updated);
            }
            None => stored.doc = updated,
        }

        Ok(UpdateResult {
            matched_count: 1,
            modified_count: modified,
        })
    }

    /// Publish the running transaction's writes
    pub async fn commit_transaction(&mut self) -> StorageResult<()> {
        let txn = self.txn.take().ok_or(StorageError::NoTransaction)?;
        let mut state = self.state.lock();
        let written = txn.writes.len();
        for ((collection, id), doc) in txn.writes {
            if let Some(stored) = state
                .collections
                .get_mut(&collection)
                .and_then(|c| c.docs.get_mut(&id))
            {
                stored.doc = doc;
                stored.intent = None;
            }
        }
        debug!(session = %self.id, txn_number = self.txn_number, written, "transaction committed");
        Ok(())
    }

    /// Discard the running transaction's writes
    pub async fn abort_transaction(&mut self) -> StorageResult<()> {
        let txn = self.txn.take().ok_or(StorageError::NoTransaction)?;
        self.release(txn);
        Ok(())
    }

    fn release(&self, txn: SessionTxn) {
        let mut state = self.state.lock();
        for (collection, id) in txn.writes.keys() {
            if let Some(stored) = state
                .collections
                .get_mut(collection)
                .and_then(|c| c.docs.get_mut(id))
            {
                if stored.intent == Some(self.id) {
                    stored.intent = None;
                }
            }
        }
        debug!(session = %self.id, txn_number = self.txn_number, discarded = txn.writes.len(), "transaction aborted");
    }

    /// Documents of `coll` as this session sees them, narrowed by `_id` when
    /// the filter names one
    fn candidates<'a>(
        &'a self,
        collection: &'a str,
        coll: &'a Collection,
        filter: &'a Document,
    ) -> impl Iterator<Item = (&'a str, &'a Document)> + 'a {
        let pinned = doc_id(filter);
        coll.docs
            .iter()
            .filter(move |(id, _)| pinned.map_or(true, |p| p == id.as_str()))
            .map(move |(id, stored)| {
                let own = self
                    .txn
                    .as_ref()
                    .and_then(|t| t.writes.get(&(collection.to_string(), id.clone())));
                (id.as_str(), own.unwrap_or(&stored.doc))
            })
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        if let Some(txn) = self.txn.take() {
            self.release(txn);
        }
    }
}

impl fmt::Debug for DocumentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSession")
            .field("id", &self.id)
            .field("in_transaction", &self.txn.is_some())
            .field("txn_number", &self.txn_number)
            .finish()
    }
}
