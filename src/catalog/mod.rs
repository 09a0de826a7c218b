//! The catalog store
//!
//! The catalog is the server's persistent state: a table of stored files,
//! each with a numeric id, a display name and a storage path, and a table of
//! user credentials.
//!
//! Sessions see the catalog only through the [`CatalogStore`] trait. The production
//! implementation is [`SqliteCatalog`].
//!
//! All operations are synchronous. Async callers should go through [`run_blocking`]
//! so a slow database cannot stall other sessions.

use std::sync::Arc;

mod credential;
pub use credential::{hash_secret, verify_secret};
mod sqlite;
pub use sqlite::SqliteCatalog;

/// A stored file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogRecord {
    /// Catalog-assigned id, unique and stable for the life of the record
    pub id: i64,
    /// Human-readable name
    pub name: String,
    /// Where the file lives on the server's filesystem
    pub storage_path: String,
}

/// Catalog failures
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The underlying database failed
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A filesystem operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A directory scan pattern could not be built
    #[error("bad scan pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    /// A stored credential could not be parsed
    #[error("stored credential for {0:?} is malformed")]
    MalformedCredential(String),
    /// The blocking worker panicked or was cancelled
    #[error("catalog worker failed: {0}")]
    Worker(String),
}

/// Read and write access to the catalog.
///
/// Implementations must be safe to share between sessions.
pub trait CatalogStore: Send + Sync + std::fmt::Debug {
    /// Every record, ordered by id
    fn list_all(&self) -> Result<Vec<CatalogRecord>, CatalogError>;

    /// The record with this id, if any
    fn find_by_id(&self, id: i64) -> Result<Option<CatalogRecord>, CatalogError>;

    /// A uniformly random record, or `None` if the catalog is empty
    fn pick_random(&self) -> Result<Option<CatalogRecord>, CatalogError>;

    /// Adds a record and returns its newly assigned id
    fn insert(&self, name: &str, storage_path: &str) -> Result<i64, CatalogError>;

    /// The stored credential for `username`, if the user exists
    fn find_credential(&self, username: &str) -> Result<Option<String>, CatalogError>;

    /// Does `secret` match the credential stored for `username`?
    ///
    /// An unknown user is simply a mismatch.
    fn verify_credential(&self, username: &str, secret: &[u8]) -> Result<bool, CatalogError> {
        match self.find_credential(username)? {
            Some(stored) => verify_secret(username, &stored, secret),
            None => Ok(false),
        }
    }
}

/// Shared handle to a catalog, as held by sessions
pub type SharedCatalog = Arc<dyn CatalogStore>;

/// Runs a catalog operation on the blocking thread pool
pub async fn run_blocking<T, F>(catalog: &SharedCatalog, f: F) -> Result<T, CatalogError>
where
    F: FnOnce(&dyn CatalogStore) -> Result<T, CatalogError> + Send + 'static,
    T: Send + 'static,
{
    let catalog = Arc::clone(catalog);
    tokio::task::spawn_blocking(move || f(catalog.as_ref()))
        .await
        .map_err(|e| CatalogError::Worker(e.to_string()))?
}
