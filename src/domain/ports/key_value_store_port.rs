//! Port for string key/value persistence.

use async_trait::async_trait;

use crate::domain::errors::StorageError;

/// A persistent key/value store with string keys and values.
///
/// Writes may be rejected by ambient quota limits. Implementations must be
/// thread-safe.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes a value. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Lists all stored keys.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Returns the number of stored keys.
    async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.keys().await?.len())
    }

    /// Removes every stored value.
    async fn clear(&self) -> Result<(), StorageError>;
}
