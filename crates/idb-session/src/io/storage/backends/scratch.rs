use serde_json::Value;

use crate::codec;
use crate::io::storage::KeyValueBackend;
use crate::scratch::ScratchStorage;
use crate::{Result, StoreError};

/// Scratch storage seen through the value codec.
///
/// Values are stored as text: objects and arrays as JSON, strings verbatim, other scalars in
/// their printed form. Reads decode JSON objects and arrays and return everything else as a
/// string.
#[derive(Debug, Clone)]
pub struct ScratchBackend<S> {
    storage: S,
}

impl<S: ScratchStorage> ScratchBackend<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

impl<S: ScratchStorage> KeyValueBackend for ScratchBackend<S> {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let text = self.storage.get_item(key)?;
        Ok(text.map(|text| codec::decode(&text)))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.storage.set_item(key, &codec::encode(&value))
    }

    /// Read-modify-write. Scratch storage is synchronous, so nothing can interleave between
    /// the read and the write.
    async fn update<F, Cause>(&self, key: &str, updater: F) -> Result<()>
    where
        F: FnOnce(Option<Value>) -> std::result::Result<Value, Cause>,
        Cause: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let current = self.get(key).await?;
        let next = updater(current).map_err(StoreError::updater)?;
        self.set(key, next).await
    }

    async fn remove<K: AsRef<str>>(&self, keys: &[K]) -> Result<()> {
        for key in keys {
            self.storage.remove_item(key.as_ref())?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.storage.clear()
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.storage.keys()
    }

    async fn values(&self) -> Result<Vec<Value>> {
        let entries = self.entries().await?;
        Ok(entries.into_iter().map(|(_, value)| value).collect())
    }

    async fn entries(&self) -> Result<Vec<(String, Value)>> {
        let mut entries = Vec::new();
        for key in self.storage.keys()? {
            if let Some(text) = self.storage.get_item(&key)? {
                entries.push((key, codec::decode(&text)));
            }
        }
        Ok(entries)
    }
}
