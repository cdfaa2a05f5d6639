//! Best-effort session storage facade over IndexedDB with a scratch-storage fallback.
//!
//! Every call picks one backend up front: the scratch backend when the caller asks for it or
//! when IndexedDB was not detected, IndexedDB otherwise. Failures are logged and swallowed, so
//! reads yield `None` and writes simply have no effect.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::{self, GlobalScope};
use crate::engine::Engine;
use crate::io::storage::backends::scratch::ScratchBackend;
use crate::io::storage::{BackendKind, KeyValueBackend, Route};
use crate::scratch::ScratchStorage;
use crate::store::{IdbStore, IdbStoreOptions};
use crate::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub db_name: String,
    /// Appended to `db_name` as `{db_name}-{namespace}` so several apps can share an origin.
    pub namespace: Option<String>,
    pub store_name: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            db_name: "idbSession".to_owned(),
            namespace: None,
            store_name: "KeyValue".to_owned(),
        }
    }
}

impl SessionOptions {
    /// Name of the database actually opened.
    pub fn database_name(&self) -> String {
        match self.namespace.as_deref() {
            Some(namespace) if !namespace.is_empty() => format!("{}-{namespace}", self.db_name),
            _ => self.db_name.clone(),
        }
    }

    pub fn store_options(&self) -> IdbStoreOptions {
        IdbStoreOptions {
            db_name: self.database_name(),
            store_name: self.store_name.clone(),
        }
    }
}

/// Per-call backend override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Prefer {
    /// IndexedDB when it was detected, scratch storage otherwise.
    #[default]
    Auto,
    /// Always scratch storage.
    Fallback,
}

/// Keys passed to [`IdbSession::remove_item`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySelection {
    One(String),
    Many(Vec<String>),
}

impl KeySelection {
    /// The keys to remove. An empty single key selects nothing.
    pub fn into_keys(self) -> Vec<String> {
        match self {
            KeySelection::One(key) if key.is_empty() => Vec::new(),
            KeySelection::One(key) => vec![key],
            KeySelection::Many(keys) => keys,
        }
    }
}

impl From<&str> for KeySelection {
    fn from(key: &str) -> Self {
        KeySelection::One(key.to_owned())
    }
}

impl From<String> for KeySelection {
    fn from(key: String) -> Self {
        KeySelection::One(key)
    }
}

impl From<Vec<String>> for KeySelection {
    fn from(keys: Vec<String>) -> Self {
        KeySelection::Many(keys)
    }
}

impl From<Vec<&str>> for KeySelection {
    fn from(keys: Vec<&str>) -> Self {
        KeySelection::Many(keys.into_iter().map(str::to_owned).collect())
    }
}

impl From<&[&str]> for KeySelection {
    fn from(keys: &[&str]) -> Self {
        KeySelection::Many(keys.iter().map(|key| (*key).to_owned()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for KeySelection {
    fn from(keys: [&str; N]) -> Self {
        KeySelection::Many(keys.iter().map(|key| (*key).to_owned()).collect())
    }
}

/// Session-style key/value storage that never fails.
pub struct IdbSession<E: Engine, S: ScratchStorage> {
    store: IdbStore<E>,
    scratch: ScratchBackend<S>,
    indexed_db: Cell<bool>,
}

impl<E: Engine, S: ScratchStorage> fmt::Debug for IdbSession<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdbSession")
            .field("store", &self.store)
            .field("indexed_db", &self.indexed_db.get())
            .finish_non_exhaustive()
    }
}

impl<E: Engine, S: ScratchStorage> IdbSession<E, S> {
    /// Builds a session and probes `scope` once for IndexedDB support.
    pub fn new<G>(options: SessionOptions, engine: E, scratch: S, scope: &G) -> Result<Self>
    where
        G: GlobalScope + ?Sized,
    {
        let store = IdbStore::new(engine, options.store_options())?;
        Ok(Self {
            store,
            scratch: ScratchBackend::new(scratch),
            indexed_db: Cell::new(capability::supports_indexed_db(scope)),
        })
    }

    /// Whether IndexedDB was detected when the session was built (or last redetected).
    pub fn uses_indexed_db(&self) -> bool {
        self.indexed_db.get()
    }

    /// Probes `scope` again and stores the new outcome.
    pub fn redetect<G: GlobalScope + ?Sized>(&self, scope: &G) -> bool {
        let supported = capability::supports_indexed_db(scope);
        self.indexed_db.set(supported);
        supported
    }

    /// Drops the memoized IndexedDB connection; the next call reopens it.
    pub fn reset(&self) {
        self.store.reset();
    }

    pub fn store(&self) -> &IdbStore<E> {
        &self.store
    }

    pub fn scratch(&self) -> &S {
        self.scratch.storage()
    }

    /// Backend used for a call made with `prefer`.
    pub fn route(&self, prefer: Prefer) -> Route<'_, E, S> {
        match prefer {
            Prefer::Auto if self.indexed_db.get() => Route::IndexedDb(&self.store),
            Prefer::Auto | Prefer::Fallback => Route::Scratch(&self.scratch),
        }
    }

    pub async fn set_item<T>(&self, key: &str, value: &T, prefer: Prefer)
    where
        T: Serialize + ?Sized,
    {
        let route = self.route(prefer);
        let outcome = match serde_json::to_value(value) {
            Ok(value) => route.set(key, value).await,
            Err(err) => Err(StoreError::Data(err.to_string())),
        };
        report("set_item", route.kind(), outcome);
    }

    pub async fn get_item(&self, key: &str, prefer: Prefer) -> Option<Value> {
        let route = self.route(prefer);
        let outcome = route.get(key).await;
        report("get_item", route.kind(), outcome).flatten()
    }

    /// Replaces the value under `key` with `updater(current)`.
    ///
    /// On IndexedDB the read and the write share one transaction. If `updater` fails nothing
    /// is written.
    pub async fn update_item<F, Cause>(&self, key: &str, updater: F, prefer: Prefer)
    where
        F: FnOnce(Option<Value>) -> std::result::Result<Value, Cause>,
        Cause: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let route = self.route(prefer);
        let outcome = route.update(key, updater).await;
        report("update_item", route.kind(), outcome);
    }

    /// Removes one key or a list of keys. Missing keys are ignored.
    pub async fn remove_item(&self, keys: impl Into<KeySelection>, prefer: Prefer) {
        let keys = keys.into().into_keys();
        let route = self.route(prefer);
        let outcome = route.remove(&keys).await;
        report("remove_item", route.kind(), outcome);
    }

    pub async fn clear(&self, prefer: Prefer) {
        let route = self.route(prefer);
        let outcome = route.clear().await;
        report("clear", route.kind(), outcome);
    }

    /// Every stored item, keyed by its key.
    pub async fn get_all_item(&self, prefer: Prefer) -> Option<BTreeMap<String, Value>> {
        let route = self.route(prefer);
        let outcome = route.entries().await;
        report("get_all_item", route.kind(), outcome)
            .map(|entries| entries.into_iter().collect())
    }

    /// Every stored key, in backend order.
    pub async fn get_all_key(&self, prefer: Prefer) -> Option<Vec<String>> {
        let route = self.route(prefer);
        let outcome = route.keys().await;
        report("get_all_key", route.kind(), outcome)
    }
}

fn report<T>(op: &'static str, backend: BackendKind, outcome: Result<T>) -> Option<T> {
    match outcome {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(op, ?backend, error = %err, "idb-session operation failed");
            None
        }
    }
}
