//! SQLite-backed implementation of `Engine`
//!
//! Files and directories live in one table, giving persistence across program
//! runs without a filesystem layout.

use std::path::Path;

use blobbuf::{BlobError, BlobResult, BoxedEngine, Engine, EngineError, EngineOptions};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

/// SQLite-backed blob storage
///
/// Parent directories of written files are implied, as with object stores.
pub struct SqliteFs {
    /// Path to the SQLite database file
    db_path: String,
    conn: Mutex<Connection>,
}

fn backend(e: &rusqlite::Error) -> EngineError {
    EngineError::backend(e.to_string())
}

impl SqliteFs {
    /// Open the database at the given path
    ///
    /// Creates the database and table if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened or table creation fails.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, rusqlite::Error> {
        let db_path = db_path.as_ref().to_string_lossy().to_string();

        let conn = Connection::open(&db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS blobs (
                path TEXT PRIMARY KEY,
                is_dir INTEGER NOT NULL,
                data BLOB NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            db_path,
            conn: Mutex::new(conn),
        })
    }

    #[must_use]
    pub fn db_path(&self) -> &str {
        &self.db_path
    }
}

/// `None` if missing, otherwise whether the path is a directory
fn kind(conn: &Connection, path: &str) -> Result<Option<bool>, rusqlite::Error> {
    let explicit = conn
        .query_row(
            "SELECT is_dir FROM blobs WHERE path = ?",
            params![path],
            |row| row.get::<_, bool>(0),
        )
        .optional()?;
    if explicit.is_some() {
        return Ok(explicit);
    }

    let prefix = format!("{path}/");
    let below: i64 = conn.query_row(
        "SELECT COUNT(*) FROM blobs WHERE substr(path, 1, length(?1)) = ?1",
        params![prefix],
        |row| row.get(0),
    )?;
    Ok((below > 0).then_some(true))
}

// The connection guard is held across each check-then-insert.
impl Engine for SqliteFs {
    async fn exists(&self, path: &str) -> Result<bool, EngineError> {
        kind(&self.conn.lock(), path)
            .map(|kind| kind.is_some())
            .map_err(|e| backend(&e))
    }

    async fn mkdir(&self, path: &str) -> Result<(), EngineError> {
        let conn = self.conn.lock();
        if kind(&conn, path).map_err(|e| backend(&e))?.is_some() {
            return Err(EngineError::AlreadyExists(path.to_string()));
        }
        conn.execute(
            "INSERT INTO blobs (path, is_dir, data) VALUES (?, 1, x'')",
            params![path],
        )
        .map(drop)
        .map_err(|e| backend(&e))
    }

    async fn touch(&self, path: &str) -> Result<(), EngineError> {
        let conn = self.conn.lock();
        match kind(&conn, path).map_err(|e| backend(&e))? {
            Some(true) => Err(EngineError::AlreadyExists(path.to_string())),
            Some(false) => Ok(()),
            None => conn
                .execute(
                    "INSERT INTO blobs (path, is_dir, data) VALUES (?, 0, x'')",
                    params![path],
                )
                .map(drop)
                .map_err(|e| backend(&e)),
        }
    }

    async fn read_all(&self, path: &str) -> Result<Vec<u8>, EngineError> {
        self.conn
            .lock()
            .query_row(
                "SELECT data FROM blobs WHERE path = ? AND is_dir = 0",
                params![path],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
            .map_err(|e| backend(&e))?
            .ok_or_else(|| EngineError::NotFound(path.to_string()))
    }

    async fn write_all(&self, path: &str, content: &[u8]) -> Result<(), EngineError> {
        let conn = self.conn.lock();
        if kind(&conn, path).map_err(|e| backend(&e))? == Some(true) {
            return Err(EngineError::AlreadyExists(path.to_string()));
        }
        conn.execute(
            "INSERT OR REPLACE INTO blobs (path, is_dir, data) VALUES (?, 0, ?)",
            params![path, content],
        )
        .map(drop)
        .map_err(|e| backend(&e))
    }

    async fn establish_session(&self) -> Result<(), EngineError> {
        self.conn
            .lock()
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(drop)
            .map_err(|e| backend(&e))
    }
}

/// Constructor for the `sqlite` protocol; option `path` names the database file.
///
/// # Errors
///
/// `Config` if `path` is missing, engine error if the database cannot be opened.
pub fn create_sqlitefs(options: &EngineOptions) -> BlobResult<BoxedEngine> {
    let path = options
        .get("path")
        .ok_or_else(|| BlobError::config("sqlite engine needs a 'path' option"))?;
    let engine = SqliteFs::new(path).map_err(|e| BlobError::Engine(backend(&e)))?;
    Ok(BoxedEngine::new(engine))
}
