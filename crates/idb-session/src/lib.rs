//! Session-style key/value storage for browser environments.
//!
//! Values go to IndexedDB when the browser exposes a usable factory and to `sessionStorage`
//! otherwise (or when a caller asks for it). The crate has three layers:
//!
//! - [`IdbStore`]: awaitable access to one IndexedDB object store, with atomic batch writes
//!   and read-modify-write updates.
//! - [`capability`] and [`codec`]: backend detection, and the string form used by
//!   `sessionStorage`.
//! - [`IdbSession`]: the facade that routes each call and never fails.
//!
//! Engines sit behind the [`engine::Engine`] and [`ScratchStorage`] traits. The browser
//! implementations live in `platform` (wasm32 only); [`memory`] provides in-memory ones for
//! native hosts and tests.

pub mod bridge;
pub mod capability;
pub mod codec;
pub mod engine;
mod error;
pub mod io;
pub mod memory;
#[cfg(target_arch = "wasm32")]
pub mod platform;
pub mod scratch;
pub mod session;
pub mod store;

pub use crate::capability::{supports_indexed_db, Capability};
pub use crate::engine::TxMode;
pub use crate::error::{Result, StoreError};
pub use crate::io::storage::backends::scratch::ScratchBackend;
pub use crate::io::storage::{BackendKind, KeyValueBackend, Route};
pub use crate::memory::{MemoryEngine, MemoryEngineOptions, MemoryScratch};
pub use crate::scratch::ScratchStorage;
pub use crate::session::{IdbSession, KeySelection, Prefer, SessionOptions};
pub use crate::store::{IdbStore, IdbStoreOptions, TransactionRunner};
