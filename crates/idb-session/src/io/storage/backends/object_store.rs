use serde_json::Value;

use crate::engine::Engine;
use crate::io::storage::KeyValueBackend;
use crate::store::IdbStore;
use crate::Result;

impl<E: Engine> KeyValueBackend for IdbStore<E> {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        IdbStore::get(self, key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        IdbStore::set(self, key, value).await
    }

    async fn update<F, Cause>(&self, key: &str, updater: F) -> Result<()>
    where
        F: FnOnce(Option<Value>) -> std::result::Result<Value, Cause>,
        Cause: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        IdbStore::update(self, key, updater).await
    }

    async fn remove<K: AsRef<str>>(&self, keys: &[K]) -> Result<()> {
        self.del_many(keys).await
    }

    async fn clear(&self) -> Result<()> {
        IdbStore::clear(self).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        IdbStore::keys(self).await
    }

    async fn values(&self) -> Result<Vec<Value>> {
        IdbStore::values(self).await
    }

    async fn entries(&self) -> Result<Vec<(String, Value)>> {
        IdbStore::entries(self).await
    }
}
