use wasm_bindgen::JsValue;
use web_sys::Storage;

use crate::scratch::ScratchStorage;
use crate::{Result, StoreError};

/// `window.sessionStorage`.
#[derive(Debug, Clone)]
pub struct SessionStorage {
    storage: Storage,
}

impl SessionStorage {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn from_global() -> Result<Self> {
        let window = web_sys::window().ok_or(StoreError::Unavailable)?;
        let storage = window.session_storage()?.ok_or(StoreError::Unavailable)?;
        Ok(Self::new(storage))
    }
}

impl ScratchStorage for SessionStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.storage.get_item(key)?)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        Ok(self.storage.set_item(key, value)?)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        Ok(self.storage.remove_item(key)?)
    }

    fn clear(&self) -> Result<()> {
        Ok(self.storage.clear()?)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let len = self.storage.length()?;
        let keys = (0..len)
            .filter_map(|index| self.storage.key(index).transpose())
            .collect::<std::result::Result<Vec<_>, JsValue>>()?;
        Ok(keys)
    }
}
