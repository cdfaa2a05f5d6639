//! Browser bindings for the engine and scratch-storage traits.
//!
//! Everything here talks to the real JS globals through `web-sys`, so it only exists on
//! wasm32.

pub mod globals;
pub mod indexeddb;
pub mod session_storage;

pub use globals::{BrowserGlobals, JsBinding};
pub use indexeddb::{IndexedDbConnection, IndexedDbCursor, IndexedDbEngine, IndexedDbStore};
pub use session_storage::SessionStorage;

use crate::session::{IdbSession, SessionOptions};
use crate::Result;

impl IdbSession<IndexedDbEngine, SessionStorage> {
    /// Session over the current global's IndexedDB factory and `sessionStorage`.
    ///
    /// Fails only when `sessionStorage` itself is unavailable; a missing IndexedDB just routes
    /// every call to the fallback.
    pub fn in_browser(options: SessionOptions) -> Result<Self> {
        IdbSession::new(
            options,
            IndexedDbEngine::from_global(),
            SessionStorage::from_global()?,
            &BrowserGlobals,
        )
    }
}
