//! Seam between the accessor and a transactional object-store engine.
//!
//! The shapes mirror IndexedDB: a factory opens named databases, a connection hands out
//! transactions scoped to one object store, and every data operation returns a pending
//! [`Request`] that the engine settles later. Engines live in [`crate::memory`] (any target)
//! and `crate::platform` (wasm32).

use futures_util::stream::{self, Stream};
use serde_json::Value;

use crate::bridge::Request;
use crate::Result;

/// Transaction mode, as passed to `IDBDatabase.transaction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

/// Entry point of an engine (the `IDBFactory` role).
pub trait Engine: Clone + 'static {
    type Connection: Connection;

    /// Opens `db_name`. When the database does not exist yet it is created and `store_name`
    /// is created inside it before the request settles.
    fn open(&self, db_name: &str, store_name: &str) -> Request<Self::Connection>;

    /// Deletes `db_name` and everything in it. Deleting a missing database succeeds.
    fn delete_database(&self, db_name: &str) -> Request<()>;
}

/// An open database (the `IDBDatabase` role).
pub trait Connection: 'static {
    type Store: ObjectStore;

    /// Starts a transaction over `store_name` and returns its object store handle.
    fn transaction(&self, store_name: &str, mode: TxMode) -> Result<Self::Store>;

    fn close(&self);
}

/// One object store inside one transaction.
///
/// Requests issued on a handle all belong to the same transaction. A failed write request
/// aborts the whole transaction, which then reports the failure from [`ObjectStore::done`].
pub trait ObjectStore {
    type Cursor: Cursor;

    fn get(&self, key: &str) -> Request<Option<Value>>;
    fn put(&self, key: &str, value: Value) -> Request<()>;
    fn delete(&self, key: &str) -> Request<()>;
    fn clear(&self) -> Request<()>;

    /// Bulk read of every value in key order, when the engine supports it.
    fn get_all(&self) -> Option<Request<Vec<Value>>>;
    /// Bulk read of every key in order, when the engine supports it.
    fn get_all_keys(&self) -> Option<Request<Vec<String>>>;

    /// Opens a cursor positioned on the first entry, or `None` for an empty store.
    fn open_cursor(&self) -> Request<Option<Self::Cursor>>;

    /// Settles when the transaction commits, or fails with the error that aborted it.
    fn done(&self) -> Request<()>;

    /// Aborts the transaction; pending writes are rolled back.
    fn abort(&self);
}

pub trait Cursor: Sized {
    fn key(&self) -> Result<String>;
    /// The current value. Fails when the stored value cannot be represented as JSON.
    fn value(&self) -> Result<Value>;

    /// Moves to the next entry; `None` once the cursor ran past the end.
    fn advance(self) -> Request<Option<Self>>;
}

/// Walks a cursor lazily, yielding every `(key, value)` pair once.
///
/// The stream ends after the last entry or right after the first error, including an entry
/// whose key or value cannot be read. Opening another cursor restarts the walk.
pub fn walk<C: Cursor>(first: Request<Option<C>>) -> impl Stream<Item = Result<(String, Value)>> {
    stream::unfold(Some(first), |pending| async move {
        let cursor = match pending?.await {
            Ok(Some(cursor)) => cursor,
            Ok(None) => return None,
            Err(err) => return Some((Err(err), None)),
        };
        match read_entry(&cursor) {
            Ok(entry) => Some((Ok(entry), Some(cursor.advance()))),
            Err(err) => Some((Err(err), None)),
        }
    })
}

fn read_entry<C: Cursor>(cursor: &C) -> Result<(String, Value)> {
    Ok((cursor.key()?, cursor.value()?))
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use futures_util::{StreamExt, TryStreamExt};
    use pollster::block_on;
    use serde_json::json;

    use super::*;
    use crate::StoreError;

    /// Cursor over fixed entries; `None` values cannot be read.
    struct FixedCursor {
        entries: Rc<Vec<(&'static str, Option<Value>)>>,
        pos: usize,
    }

    impl FixedCursor {
        fn open(entries: Vec<(&'static str, Option<Value>)>) -> Request<Option<Self>> {
            let cursor = (!entries.is_empty()).then(|| FixedCursor {
                entries: Rc::new(entries),
                pos: 0,
            });
            Request::ready(Ok(cursor))
        }
    }

    impl Cursor for FixedCursor {
        fn key(&self) -> Result<String> {
            Ok(self.entries[self.pos].0.to_owned())
        }

        fn value(&self) -> Result<Value> {
            self.entries[self.pos]
                .1
                .clone()
                .ok_or_else(|| StoreError::Data("value is not JSON".to_owned()))
        }

        fn advance(self) -> Request<Option<Self>> {
            let pos = self.pos + 1;
            let next = (pos < self.entries.len()).then(|| FixedCursor {
                entries: self.entries,
                pos,
            });
            Request::ready(Ok(next))
        }
    }

    #[test]
    fn walk_yields_every_entry_in_order() {
        let first = FixedCursor::open(vec![("a", Some(json!(1))), ("b", Some(json!([2])))]);
        let entries = block_on(walk(first).try_collect::<Vec<_>>()).unwrap();
        let keys: Vec<_> = entries.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(entries[1].1, json!([2]));
    }

    #[test]
    fn walk_of_empty_store_is_empty() {
        let entries = block_on(walk(FixedCursor::open(Vec::new())).collect::<Vec<_>>());
        assert!(entries.is_empty());
    }

    #[test]
    fn unreadable_value_ends_walk_with_error() {
        let first = FixedCursor::open(vec![
            ("a", Some(json!(1))),
            ("b", None),
            ("c", Some(json!(3))),
        ]);
        let items = block_on(walk(first).collect::<Vec<_>>());
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &("a".to_owned(), json!(1)));
        assert!(matches!(items[1], Err(StoreError::Data(_))));

        let only_bad = FixedCursor::open(vec![("x", None)]);
        let err = block_on(walk(only_bad).try_collect::<Vec<_>>()).unwrap_err();
        assert!(matches!(err, StoreError::Data(_)));
    }
}
