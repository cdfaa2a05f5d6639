use serde_json::Value;

use crate::engine::Engine;
use crate::scratch::ScratchStorage;
use crate::store::IdbStore;
use crate::Result;

pub mod backends;

use backends::scratch::ScratchBackend;

/// Operations every storage backend offers to the session facade.
///
/// Implemented by [`IdbStore`] (transactional) and [`ScratchBackend`] (string-only scratch
/// storage behind the value codec), and by [`Route`], which forwards to whichever of the two
/// was picked for a call.
#[allow(async_fn_in_trait)]
pub trait KeyValueBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    async fn update<F, Cause>(&self, key: &str, updater: F) -> Result<()>
    where
        F: FnOnce(Option<Value>) -> std::result::Result<Value, Cause>,
        Cause: Into<Box<dyn std::error::Error + Send + Sync>>;
    /// Removes every key in `keys`; absent keys are ignored.
    async fn remove<K: AsRef<str>>(&self, keys: &[K]) -> Result<()>;
    async fn clear(&self) -> Result<()>;
    async fn keys(&self) -> Result<Vec<String>>;
    async fn values(&self) -> Result<Vec<Value>>;
    async fn entries(&self) -> Result<Vec<(String, Value)>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    IndexedDb,
    Scratch,
}

/// The backend chosen for one call.
pub enum Route<'a, E: Engine, S: ScratchStorage> {
    IndexedDb(&'a IdbStore<E>),
    Scratch(&'a ScratchBackend<S>),
}

impl<E: Engine, S: ScratchStorage> Route<'_, E, S> {
    pub fn kind(&self) -> BackendKind {
        match self {
            Route::IndexedDb(_) => BackendKind::IndexedDb,
            Route::Scratch(_) => BackendKind::Scratch,
        }
    }
}

impl<E: Engine, S: ScratchStorage> KeyValueBackend for Route<'_, E, S> {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        match self {
            Route::IndexedDb(store) => KeyValueBackend::get(*store, key).await,
            Route::Scratch(scratch) => scratch.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        match self {
            Route::IndexedDb(store) => KeyValueBackend::set(*store, key, value).await,
            Route::Scratch(scratch) => scratch.set(key, value).await,
        }
    }

    async fn update<F, Cause>(&self, key: &str, updater: F) -> Result<()>
    where
        F: FnOnce(Option<Value>) -> std::result::Result<Value, Cause>,
        Cause: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        match self {
            Route::IndexedDb(store) => KeyValueBackend::update(*store, key, updater).await,
            Route::Scratch(scratch) => scratch.update(key, updater).await,
        }
    }

    async fn remove<K: AsRef<str>>(&self, keys: &[K]) -> Result<()> {
        match self {
            Route::IndexedDb(store) => store.remove(keys).await,
            Route::Scratch(scratch) => scratch.remove(keys).await,
        }
    }

    async fn clear(&self) -> Result<()> {
        match self {
            Route::IndexedDb(store) => KeyValueBackend::clear(*store).await,
            Route::Scratch(scratch) => scratch.clear().await,
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        match self {
            Route::IndexedDb(store) => KeyValueBackend::keys(*store).await,
            Route::Scratch(scratch) => scratch.keys().await,
        }
    }

    async fn values(&self) -> Result<Vec<Value>> {
        match self {
            Route::IndexedDb(store) => KeyValueBackend::values(*store).await,
            Route::Scratch(scratch) => scratch.values().await,
        }
    }

    async fn entries(&self) -> Result<Vec<(String, Value)>> {
        match self {
            Route::IndexedDb(store) => KeyValueBackend::entries(*store).await,
            Route::Scratch(scratch) => scratch.entries().await,
        }
    }
}
