//! SQLite-backed catalog

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension as _, params};
use tracing::{debug, info, warn};

use super::{CatalogError, CatalogRecord, CatalogStore, hash_secret};

/// How long a writer waits for another process (e.g. an admin command) to release the database
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Catalog store kept in a single SQLite database file.
///
/// The connection is serialised behind a mutex; every operation is a short statement.
#[derive(Debug)]
pub struct SqliteCatalog {
    db: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Opens (creating if necessary) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        debug!("opening catalog database {}", path.display());
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// A throwaway catalog, for tests and experiments
    pub fn in_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), CatalogError> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS users (
                username TEXT PRIMARY KEY,
                password TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS files (
                mid INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                path TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Creates or replaces a user. The secret is stored salted and hashed.
    pub fn add_user(&self, username: &str, secret: &[u8]) -> Result<(), CatalogError> {
        let stored = hash_secret(secret);
        let _ = self.db.lock().execute(
            "INSERT OR REPLACE INTO users (username, password) VALUES (?1, ?2)",
            params![username, stored],
        )?;
        info!("user {username:?} registered");
        Ok(())
    }

    /// Registers every file in `dir` whose extension is `extension`.
    ///
    /// Each file is named after its stem and stored by absolute path.
    /// Returns the new records, in path order. The whole directory is added in one transaction.
    pub fn add_directory(
        &self,
        dir: &Path,
        extension: &str,
    ) -> Result<Vec<CatalogRecord>, CatalogError> {
        let dir = dir.canonicalize()?;
        let pattern = format!(
            "{}/*.{}",
            glob::Pattern::escape(&dir.to_string_lossy()),
            glob::Pattern::escape(extension)
        );
        let mut paths = Vec::new();
        for entry in glob::glob(&pattern)? {
            let path = entry.map_err(glob::GlobError::into_error)?;
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let mut added = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(stem) = path.file_stem() else {
                warn!("skipping {}: no file name", path.display());
                continue;
            };
            let name = stem.to_string_lossy().into_owned();
            let storage_path = path.to_string_lossy().into_owned();
            let _ = tx.execute(
                "INSERT INTO files (name, path) VALUES (?1, ?2)",
                params![name, storage_path],
            )?;
            added.push(CatalogRecord {
                id: tx.last_insert_rowid(),
                name,
                storage_path,
            });
        }
        tx.commit()?;
        info!("registered {} file(s) from {}", added.len(), dir.display());
        Ok(added)
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<CatalogRecord> {
        Ok(CatalogRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            storage_path: row.get(2)?,
        })
    }
}

impl CatalogStore for SqliteCatalog {
    fn list_all(&self) -> Result<Vec<CatalogRecord>, CatalogError> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare("SELECT mid, name, path FROM files ORDER BY mid")?;
        let rows = stmt
            .query_map([], Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn find_by_id(&self, id: i64) -> Result<Option<CatalogRecord>, CatalogError> {
        Ok(self
            .db
            .lock()
            .query_row(
                "SELECT mid, name, path FROM files WHERE mid = ?1",
                params![id],
                Self::row_to_record,
            )
            .optional()?)
    }

    fn pick_random(&self) -> Result<Option<CatalogRecord>, CatalogError> {
        Ok(self
            .db
            .lock()
            .query_row(
                "SELECT mid, name, path FROM files ORDER BY RANDOM() LIMIT 1",
                [],
                Self::row_to_record,
            )
            .optional()?)
    }

    fn insert(&self, name: &str, storage_path: &str) -> Result<i64, CatalogError> {
        let conn = self.db.lock();
        let _ = conn.execute(
            "INSERT INTO files (name, path) VALUES (?1, ?2)",
            params![name, storage_path],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn find_credential(&self, username: &str) -> Result<Option<String>, CatalogError> {
        Ok(self
            .db
            .lock()
            .query_row(
                "SELECT password FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?)
    }
}
