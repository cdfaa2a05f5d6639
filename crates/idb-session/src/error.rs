use std::sync::Arc;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsValue;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type shared by the accessor, the engines and the session facade.
///
/// The type is `Clone` because one failed database open is observed by every operation
/// that was waiting on the shared connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend is not available in this context")]
    Unavailable,
    #[error("failed to open database {db:?}: {reason}")]
    Open { db: String, reason: String },
    #[error("object store {0:?} does not exist in this database")]
    NotFound(String),
    #[error("write attempted in a read-only transaction")]
    ReadOnly,
    #[error("database connection is closed")]
    Closed,
    #[error("transaction aborted: {0}")]
    Aborted(String),
    #[error("quota exceeded while writing")]
    QuotaExceeded,
    #[error("value could not be stored: {0}")]
    Data(String),
    #[error("update callback failed: {0}")]
    Updater(Arc<dyn std::error::Error + Send + Sync>),
    #[error("request was dropped before it settled")]
    Abandoned,
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[cfg(target_arch = "wasm32")]
    #[error("indexeddb operation failed: {0:?}")]
    Js(JsValue),
}

impl StoreError {
    pub(crate) fn updater<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        StoreError::Updater(Arc::from(err.into()))
    }

    #[cfg(target_arch = "wasm32")]
    pub(crate) fn from_dom_exception(ex: &web_sys::DomException) -> Self {
        // https://webidl.spec.whatwg.org/#idl-DOMException-error-names
        match ex.name().as_str() {
            "QuotaExceededError" => StoreError::QuotaExceeded,
            "NotFoundError" => StoreError::NotFound(ex.message()),
            "ReadOnlyError" => StoreError::ReadOnly,
            "InvalidStateError" => StoreError::Closed,
            "DataError" | "DataCloneError" => StoreError::Data(ex.message()),
            "AbortError" => StoreError::Aborted(ex.message()),
            _ => StoreError::Js(ex.into()),
        }
    }
}

#[cfg(target_arch = "wasm32")]
impl From<JsValue> for StoreError {
    fn from(value: JsValue) -> Self {
        use wasm_bindgen::JsCast;

        match value.dyn_ref::<web_sys::DomException>() {
            Some(ex) => StoreError::from_dom_exception(ex),
            None => StoreError::Js(value),
        }
    }
}
