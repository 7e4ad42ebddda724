use anyhow::Result;

/// Object-safe key/value store holding the persisted engine state.
///
/// Values are JSON documents. Implementations must be internally synchronized.
pub trait StateStore: Send + Sync {
    /// Retrieves the value associated with the given key, or `None` if not found.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Sets the value for the given key, overwriting any existing value.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Removes the item with the given key.
    fn remove_item(&self, key: &str) -> Result<()>;

    /// Returns all keys in the store, sorted.
    fn keys(&self) -> Result<Vec<String>>;
}
