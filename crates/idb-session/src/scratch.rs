/// Synchronous, string-only key/value storage (the `sessionStorage` role).
///
/// Implementations: [`crate::memory::MemoryScratch`] and, on wasm32,
/// `crate::platform::SessionStorage`.
pub trait ScratchStorage {
    fn get_item(&self, key: &str) -> crate::Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> crate::Result<()>;
    fn remove_item(&self, key: &str) -> crate::Result<()>;
    fn clear(&self) -> crate::Result<()>;
    fn keys(&self) -> crate::Result<Vec<String>>;
}
