//! Object-store accessor: one lazily opened (database, object store) pair.
//!
//! [`IdbStore`] memoizes a [`TransactionRunner`], which owns the shared connection future.
//! Every operation borrows that runner, opens one transaction, and completes once the
//! transaction has settled.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures_util::future::{self, FutureExt, LocalBoxFuture, Shared};
use futures_util::TryStreamExt;
use serde::Deserialize;
use serde_json::Value;

use crate::engine::{self, Connection, Engine, ObjectStore, TxMode};
use crate::{Result, StoreError};

type StoreOf<E> = <<E as Engine>::Connection as Connection>::Store;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IdbStoreOptions {
    pub db_name: String,
    pub store_name: String,
}

impl Default for IdbStoreOptions {
    fn default() -> Self {
        Self {
            db_name: "keyValueStore".to_owned(),
            store_name: "keyval".to_owned(),
        }
    }
}

impl IdbStoreOptions {
    pub fn validate(&self) -> Result<()> {
        if self.db_name.is_empty() {
            return Err(StoreError::InvalidConfig("db_name must not be empty"));
        }
        if self.store_name.is_empty() {
            return Err(StoreError::InvalidConfig("store_name must not be empty"));
        }
        Ok(())
    }
}

/// Closes the connection once the last runner or in-flight operation lets go of it.
struct ConnectionHandle<C: Connection>(C);

impl<C: Connection> Drop for ConnectionHandle<C> {
    fn drop(&mut self) {
        self.0.close();
    }
}

type PendingConnection<C> = Shared<LocalBoxFuture<'static, Result<Rc<ConnectionHandle<C>>>>>;

/// Runs units of work inside transactions on one (database, object store) pair.
///
/// Clones share the same pending connection, so a database is opened at most once per
/// runner no matter how many operations race on first use.
pub struct TransactionRunner<E: Engine> {
    db_name: Rc<str>,
    store_name: Rc<str>,
    connection: PendingConnection<E::Connection>,
}

impl<E: Engine> Clone for TransactionRunner<E> {
    fn clone(&self) -> Self {
        Self {
            db_name: Rc::clone(&self.db_name),
            store_name: Rc::clone(&self.store_name),
            connection: self.connection.clone(),
        }
    }
}

impl<E: Engine> fmt::Debug for TransactionRunner<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionRunner")
            .field("db_name", &self.db_name)
            .field("store_name", &self.store_name)
            .finish_non_exhaustive()
    }
}

impl<E: Engine> TransactionRunner<E> {
    /// Starts opening `db_name`; the first transaction waits for it.
    pub fn open(engine: &E, db_name: &str, store_name: &str) -> Self {
        let pending = engine.open(db_name, store_name);
        let db = db_name.to_owned();
        let connection = async move {
            let conn = pending.await.map_err(|err| {
                tracing::debug!(db = %db, error = %err, "failed to open database");
                err
            })?;
            tracing::debug!(db = %db, "database connection established");
            Ok::<_, StoreError>(Rc::new(ConnectionHandle(conn)))
        }
        .boxed_local()
        .shared();

        Self {
            db_name: Rc::from(db_name),
            store_name: Rc::from(store_name),
            connection,
        }
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Opens a `mode` transaction and hands its object store to `work`.
    pub async fn run<T, F, Fut>(&self, mode: TxMode, work: F) -> Result<T>
    where
        F: FnOnce(StoreOf<E>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let conn = self.connection.clone().await?;
        let store = conn.0.transaction(&self.store_name, mode)?;
        work(store).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.run(TxMode::ReadOnly, |store| async move {
            store.get(key).await
        })
        .await
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.run(TxMode::ReadWrite, |store| async move {
            let _ = store.put(key, value);
            store.done().await
        })
        .await
    }

    /// Writes every entry in one transaction: all of them land, or none do.
    pub async fn set_many<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.run(TxMode::ReadWrite, |store| async move {
            for (key, value) in entries {
                let _ = store.put(&key, value);
            }
            store.done().await
        })
        .await
    }

    /// Fetches `keys` in one read-only transaction. The result follows the input order.
    pub async fn get_many<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<Option<Value>>> {
        self.run(TxMode::ReadOnly, |store| async move {
            let pending: Vec<_> = keys.iter().map(|key| store.get(key.as_ref())).collect();
            future::try_join_all(pending).await
        })
        .await
    }

    /// Atomic read-modify-write of `key`.
    ///
    /// `updater` sees the current value (`None` when absent). If it fails, the transaction is
    /// aborted and nothing is written.
    pub async fn update<F, Cause>(&self, key: &str, updater: F) -> Result<()>
    where
        F: FnOnce(Option<Value>) -> std::result::Result<Value, Cause>,
        Cause: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.run(TxMode::ReadWrite, |store| async move {
            let current = store.get(key).await?;
            match updater(current) {
                Ok(next) => {
                    let _ = store.put(key, next);
                    store.done().await
                }
                Err(err) => {
                    store.abort();
                    Err(StoreError::updater(err))
                }
            }
        })
        .await
    }

    pub async fn del(&self, key: &str) -> Result<()> {
        self.run(TxMode::ReadWrite, |store| async move {
            let _ = store.delete(key);
            store.done().await
        })
        .await
    }

    pub async fn del_many<K: AsRef<str>>(&self, keys: &[K]) -> Result<()> {
        self.run(TxMode::ReadWrite, |store| async move {
            for key in keys {
                let _ = store.delete(key.as_ref());
            }
            store.done().await
        })
        .await
    }

    pub async fn clear(&self) -> Result<()> {
        self.run(TxMode::ReadWrite, |store| async move {
            let _ = store.clear();
            store.done().await
        })
        .await
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        self.run(TxMode::ReadOnly, |store| async move {
            if let Some(bulk) = store.get_all_keys() {
                return bulk.await;
            }
            engine::walk(store.open_cursor())
                .map_ok(|(key, _)| key)
                .try_collect::<Vec<_>>()
                .await
        })
        .await
    }

    pub async fn values(&self) -> Result<Vec<Value>> {
        self.run(TxMode::ReadOnly, |store| async move {
            if let Some(bulk) = store.get_all() {
                return bulk.await;
            }
            engine::walk(store.open_cursor())
                .map_ok(|(_, value)| value)
                .try_collect::<Vec<_>>()
                .await
        })
        .await
    }

    /// Every `(key, value)` pair in key order.
    ///
    /// Bulk keys and bulk values come from the same transaction and are zipped by position.
    /// Without bulk reads the pairs are collected straight off one cursor.
    pub async fn entries(&self) -> Result<Vec<(String, Value)>> {
        self.run(TxMode::ReadOnly, |store| async move {
            if let (Some(keys), Some(values)) = (store.get_all_keys(), store.get_all()) {
                let (keys, values) = future::try_join(keys, values).await?;
                return Ok(keys.into_iter().zip(values).collect());
            }
            engine::walk(store.open_cursor())
                .try_collect::<Vec<_>>()
                .await
        })
        .await
    }
}

/// Accessor for one (database, object store) pair with a lazily opened connection.
pub struct IdbStore<E: Engine> {
    engine: E,
    db_name: String,
    store_name: String,
    runner: RefCell<Option<TransactionRunner<E>>>,
}

impl<E: Engine> fmt::Debug for IdbStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdbStore")
            .field("db_name", &self.db_name)
            .field("store_name", &self.store_name)
            .field("connected", &self.runner.borrow().is_some())
            .finish()
    }
}

impl<E: Engine> IdbStore<E> {
    pub fn new(engine: E, options: IdbStoreOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            engine,
            db_name: options.db_name,
            store_name: options.store_name,
            runner: RefCell::new(None),
        })
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The memoized runner for this store, opening the database on first use.
    pub fn runner(&self) -> TransactionRunner<E> {
        self.runner
            .borrow_mut()
            .get_or_insert_with(|| {
                TransactionRunner::open(&self.engine, &self.db_name, &self.store_name)
            })
            .clone()
    }

    /// A runner for another (database, object store) pair on the same engine. It is not
    /// memoized and does not share this store's connection. Empty names are rejected the same
    /// way [`IdbStore::new`] rejects them.
    pub fn create_runner(&self, db_name: &str, store_name: &str) -> Result<TransactionRunner<E>> {
        IdbStoreOptions {
            db_name: db_name.to_owned(),
            store_name: store_name.to_owned(),
        }
        .validate()?;
        Ok(TransactionRunner::open(&self.engine, db_name, store_name))
    }

    /// Drops the memoized runner so the next operation opens a fresh connection.
    ///
    /// Operations already in flight keep the old connection until they finish. Callers must
    /// not reset while operations are still running if they rely on the new connection.
    pub fn reset(&self) {
        if self.runner.borrow_mut().take().is_some() {
            tracing::debug!(db = %self.db_name, "dropped memoized database connection");
        }
    }

    /// Resets the store and deletes its whole database.
    pub async fn delete_database(&self) -> Result<()> {
        self.reset();
        self.engine.delete_database(&self.db_name).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.runner().get(key).await
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.runner().set(key, value).await
    }

    pub async fn set_many<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.runner().set_many(entries).await
    }

    pub async fn get_many<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<Option<Value>>> {
        self.runner().get_many(keys).await
    }

    pub async fn update<F, Cause>(&self, key: &str, updater: F) -> Result<()>
    where
        F: FnOnce(Option<Value>) -> std::result::Result<Value, Cause>,
        Cause: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.runner().update(key, updater).await
    }

    pub async fn del(&self, key: &str) -> Result<()> {
        self.runner().del(key).await
    }

    pub async fn del_many<K: AsRef<str>>(&self, keys: &[K]) -> Result<()> {
        self.runner().del_many(keys).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.runner().clear().await
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        self.runner().keys().await
    }

    pub async fn values(&self) -> Result<Vec<Value>> {
        self.runner().values().await
    }

    pub async fn entries(&self) -> Result<Vec<(String, Value)>> {
        self.runner().entries().await
    }
}
