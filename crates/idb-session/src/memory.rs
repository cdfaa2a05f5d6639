//! In-memory engines for hosts without browser storage, and for tests.
//!
//! [`MemoryEngine`] follows IndexedDB's transaction rules closely enough for the accessor to
//! behave the same on both: writes are staged per transaction, a failed write aborts the whole
//! transaction, and a read-write transaction that is dropped without an explicit commit still
//! commits (IndexedDB auto-commits once no requests are pending).

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::Deserialize;
use serde_json::Value;

use crate::bridge::Request;
use crate::engine::{Connection, Cursor, Engine, ObjectStore, TxMode};
use crate::scratch::ScratchStorage;
use crate::{Result, StoreError};

type Collection = BTreeMap<String, Value>;
type Database = Rc<RefCell<BTreeMap<String, Collection>>>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MemoryEngineOptions {
    /// Expose `get_all`/`get_all_keys`. When off, scans go through cursors.
    pub bulk_read: bool,
    /// Reject (and abort the transaction of) any value whose JSON encoding is larger.
    pub max_value_bytes: Option<usize>,
}

impl Default for MemoryEngineOptions {
    fn default() -> Self {
        Self {
            bulk_read: true,
            max_value_bytes: None,
        }
    }
}

#[derive(Default)]
struct EngineState {
    options: MemoryEngineOptions,
    databases: RefCell<BTreeMap<String, Database>>,
    // Connections opened under an older generation are treated as closed.
    generation: Cell<u64>,
    opens: Cell<usize>,
}

/// Transactional engine holding every database in memory. Clones share the same databases.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    state: Rc<EngineState>,
}

impl fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("options", &self.state.options)
            .field("databases", &self.state.databases.borrow().len())
            .finish()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: MemoryEngineOptions) -> Self {
        Self {
            state: Rc::new(EngineState {
                options,
                ..EngineState::default()
            }),
        }
    }

    /// Number of `open` calls made so far.
    pub fn open_count(&self) -> usize {
        self.state.opens.get()
    }

    /// Invalidates every open connection, as a browser does when another context upgrades or
    /// deletes the database.
    pub fn disconnect_all(&self) {
        self.state.generation.set(self.state.generation.get() + 1);
    }

    /// Committed contents of one object store.
    pub fn snapshot(&self, db_name: &str, store_name: &str) -> Option<BTreeMap<String, Value>> {
        let databases = self.state.databases.borrow();
        let db = databases.get(db_name)?.borrow();
        db.get(store_name).cloned()
    }
}

impl Engine for MemoryEngine {
    type Connection = MemoryConnection;

    fn open(&self, db_name: &str, store_name: &str) -> Request<MemoryConnection> {
        self.state.opens.set(self.state.opens.get() + 1);

        let db = {
            let mut databases = self.state.databases.borrow_mut();
            match databases.get(db_name) {
                Some(db) => Rc::clone(db),
                None => {
                    // First open of this database: the upgrade step creates the store.
                    let mut stores = BTreeMap::new();
                    stores.insert(store_name.to_owned(), Collection::new());
                    let db = Rc::new(RefCell::new(stores));
                    databases.insert(db_name.to_owned(), Rc::clone(&db));
                    db
                }
            }
        };

        Request::ready(Ok(MemoryConnection {
            engine: Rc::clone(&self.state),
            db,
            generation: self.state.generation.get(),
            closed: Cell::new(false),
        }))
    }

    fn delete_database(&self, db_name: &str) -> Request<()> {
        self.state.databases.borrow_mut().remove(db_name);
        Request::ready(Ok(()))
    }
}

pub struct MemoryConnection {
    engine: Rc<EngineState>,
    db: Database,
    generation: u64,
    closed: Cell<bool>,
}

impl Connection for MemoryConnection {
    type Store = MemoryStore;

    fn transaction(&self, store_name: &str, mode: TxMode) -> Result<MemoryStore> {
        if self.closed.get() || self.generation != self.engine.generation.get() {
            return Err(StoreError::Closed);
        }
        if !self.db.borrow().contains_key(store_name) {
            return Err(StoreError::NotFound(store_name.to_owned()));
        }
        Ok(MemoryStore {
            db: Rc::clone(&self.db),
            name: store_name.to_owned(),
            mode,
            options: self.engine.options.clone(),
            tx: RefCell::new(TxState::default()),
        })
    }

    fn close(&self) {
        self.closed.set(true);
    }
}

#[derive(Debug, Default)]
enum Status {
    #[default]
    Active,
    Failed(StoreError),
    Aborted,
    Committed,
}

#[derive(Debug, Default)]
struct TxState {
    status: Status,
    cleared: bool,
    // `None` marks a staged delete.
    staged: BTreeMap<String, Option<Value>>,
}

/// Object store handle scoped to one in-memory transaction.
pub struct MemoryStore {
    db: Database,
    name: String,
    mode: TxMode,
    options: MemoryEngineOptions,
    tx: RefCell<TxState>,
}

impl MemoryStore {
    fn check_active(&self) -> Result<()> {
        match &self.tx.borrow().status {
            Status::Active => Ok(()),
            Status::Failed(err) => Err(StoreError::Aborted(err.to_string())),
            Status::Aborted => Err(StoreError::Aborted("transaction was aborted".to_owned())),
            Status::Committed => Err(StoreError::Aborted(
                "transaction already committed".to_owned(),
            )),
        }
    }

    fn check_writable(&self) -> Result<()> {
        self.check_active()?;
        if self.mode == TxMode::ReadOnly {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    fn fail(&self, err: StoreError) -> Request<()> {
        let mut tx = self.tx.borrow_mut();
        tx.status = Status::Failed(err.clone());
        tx.staged.clear();
        Request::ready(Err(err))
    }

    /// Committed data overlaid with this transaction's staged writes.
    fn view(&self) -> Collection {
        let tx = self.tx.borrow();
        let mut entries = if tx.cleared {
            Collection::new()
        } else {
            self.db
                .borrow()
                .get(&self.name)
                .cloned()
                .unwrap_or_default()
        };
        for (key, staged) in &tx.staged {
            match staged {
                Some(value) => entries.insert(key.clone(), value.clone()),
                None => entries.remove(key),
            };
        }
        entries
    }

    fn commit(&self) {
        let mut tx = self.tx.borrow_mut();
        let mut db = self.db.borrow_mut();
        let collection = db.entry(self.name.clone()).or_default();
        if tx.cleared {
            collection.clear();
        }
        for (key, staged) in std::mem::take(&mut tx.staged) {
            match staged {
                Some(value) => collection.insert(key, value),
                None => collection.remove(&key),
            };
        }
        tx.status = Status::Committed;
    }
}

impl ObjectStore for MemoryStore {
    type Cursor = MemoryCursor;

    fn get(&self, key: &str) -> Request<Option<Value>> {
        if let Err(err) = self.check_active() {
            return Request::ready(Err(err));
        }
        let tx = self.tx.borrow();
        let value = match tx.staged.get(key) {
            Some(staged) => staged.clone(),
            None if tx.cleared => None,
            None => self
                .db
                .borrow()
                .get(&self.name)
                .and_then(|collection| collection.get(key).cloned()),
        };
        Request::ready(Ok(value))
    }

    fn put(&self, key: &str, value: Value) -> Request<()> {
        if let Err(err) = self.check_writable() {
            return Request::ready(Err(err));
        }
        if let Some(limit) = self.options.max_value_bytes {
            let size = serde_json::to_vec(&value)
                .map(|bytes| bytes.len())
                .unwrap_or(0);
            if size > limit {
                return self.fail(StoreError::QuotaExceeded);
            }
        }
        self.tx
            .borrow_mut()
            .staged
            .insert(key.to_owned(), Some(value));
        Request::ready(Ok(()))
    }

    fn delete(&self, key: &str) -> Request<()> {
        if let Err(err) = self.check_writable() {
            return Request::ready(Err(err));
        }
        self.tx.borrow_mut().staged.insert(key.to_owned(), None);
        Request::ready(Ok(()))
    }

    fn clear(&self) -> Request<()> {
        if let Err(err) = self.check_writable() {
            return Request::ready(Err(err));
        }
        let mut tx = self.tx.borrow_mut();
        tx.cleared = true;
        tx.staged.clear();
        Request::ready(Ok(()))
    }

    fn get_all(&self) -> Option<Request<Vec<Value>>> {
        if !self.options.bulk_read {
            return None;
        }
        let outcome = self
            .check_active()
            .map(|()| self.view().into_values().collect());
        Some(Request::ready(outcome))
    }

    fn get_all_keys(&self) -> Option<Request<Vec<String>>> {
        if !self.options.bulk_read {
            return None;
        }
        let outcome = self
            .check_active()
            .map(|()| self.view().into_keys().collect());
        Some(Request::ready(outcome))
    }

    fn open_cursor(&self) -> Request<Option<MemoryCursor>> {
        if let Err(err) = self.check_active() {
            return Request::ready(Err(err));
        }
        let entries: Vec<(String, Value)> = self.view().into_iter().collect();
        if entries.is_empty() {
            return Request::ready(Ok(None));
        }
        Request::ready(Ok(Some(MemoryCursor {
            entries: Rc::new(entries),
            pos: 0,
        })))
    }

    fn done(&self) -> Request<()> {
        let finished = match &self.tx.borrow().status {
            Status::Active => None,
            Status::Failed(err) => Some(Err(err.clone())),
            Status::Aborted => Some(Err(StoreError::Aborted(
                "transaction was aborted".to_owned(),
            ))),
            Status::Committed => Some(Ok(())),
        };
        if let Some(outcome) = finished {
            return Request::ready(outcome);
        }
        self.commit();
        Request::ready(Ok(()))
    }

    fn abort(&self) {
        let mut tx = self.tx.borrow_mut();
        if matches!(tx.status, Status::Committed) {
            return;
        }
        tx.status = Status::Aborted;
        tx.cleared = false;
        tx.staged.clear();
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        let pending = {
            let tx = self.tx.borrow();
            matches!(tx.status, Status::Active) && (tx.cleared || !tx.staged.is_empty())
        };
        if pending && self.mode == TxMode::ReadWrite {
            self.commit();
        }
    }
}

pub struct MemoryCursor {
    entries: Rc<Vec<(String, Value)>>,
    pos: usize,
}

impl Cursor for MemoryCursor {
    fn key(&self) -> Result<String> {
        Ok(self.entries[self.pos].0.clone())
    }

    fn value(&self) -> Result<Value> {
        Ok(self.entries[self.pos].1.clone())
    }

    fn advance(self) -> Request<Option<Self>> {
        let next = self.pos + 1;
        if next >= self.entries.len() {
            return Request::ready(Ok(None));
        }
        Request::ready(Ok(Some(MemoryCursor {
            entries: self.entries,
            pos: next,
        })))
    }
}

/// String-only scratch storage kept in memory.
///
/// Clones share one map, the way every script in a browsing context sees the same
/// `sessionStorage`.
#[derive(Debug, Clone, Default)]
pub struct MemoryScratch {
    items: Rc<RefCell<BTreeMap<String, String>>>,
    quota_bytes: Option<usize>,
}

impl MemoryScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails writes once the total size of keys and values would exceed `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota_bytes: Some(bytes),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// The raw stored string, bypassing any decoding.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.items.borrow().get(key).cloned()
    }
}

impl ScratchStorage for MemoryScratch {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.items.borrow_mut();
        if let Some(quota) = self.quota_bytes {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(StoreError::QuotaExceeded);
            }
        }
        items.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.items.borrow_mut().clear();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.items.borrow().keys().cloned().collect())
    }
}
