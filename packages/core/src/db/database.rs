//! Database Connection Management
//!
//! This module provides the database connection and schema initialization
//! for the location tree, using an embedded libsql database.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf
//! - **WAL mode**: Write-Ahead Logging so readers do not block the writer
//! - **Busy timeout**: Connections wait for the write lock instead of failing
//!   immediately with `SQLITE_BUSY`
//! - **AUTOINCREMENT ids**: Location ids are never reused, so a restored
//!   location always gets a fresh id
//!
//! # Tables
//!
//! - `locations` - live tree nodes
//! - `main_locations` - one main location per content item
//! - `node_assignments` - placements requested before publish
//! - `trash` - snapshots of removed locations
//! - `content_objects` - the slice of content state the tree reads (status,
//!   hidden flag, language mask)
//!
//! # Transactions
//!
//! The database never opens transactions on its own. Callers open one
//! connection per logical operation and issue `BEGIN IMMEDIATE` / `COMMIT`
//! on it (see `LocationService`).

use crate::config::TreeConfig;
use crate::db::error::DatabaseError;
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

const SCHEMA_STATEMENTS: &[(&str, &str)] = &[
    (
        "content_objects",
        "CREATE TABLE IF NOT EXISTS content_objects (
            id INTEGER PRIMARY KEY,
            status INTEGER NOT NULL DEFAULT 1,
            current_version INTEGER NOT NULL DEFAULT 1,
            is_hidden INTEGER NOT NULL DEFAULT 0,
            language_mask INTEGER NOT NULL DEFAULT 0
        )",
    ),
    (
        "locations",
        "CREATE TABLE IF NOT EXISTS locations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            -- NULL marks the tree root
            parent_id INTEGER,
            content_id INTEGER NOT NULL,
            content_version INTEGER NOT NULL,
            path_string TEXT NOT NULL,
            path_identification TEXT NOT NULL DEFAULT '',
            depth INTEGER NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            sort_field INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL DEFAULT 1,
            remote_id TEXT NOT NULL UNIQUE,
            is_hidden INTEGER NOT NULL DEFAULT 0,
            is_invisible INTEGER NOT NULL DEFAULT 0
        )",
    ),
    (
        "main_locations",
        "CREATE TABLE IF NOT EXISTS main_locations (
            content_id INTEGER PRIMARY KEY,
            location_id INTEGER NOT NULL
        )",
    ),
    (
        "node_assignments",
        "CREATE TABLE IF NOT EXISTS node_assignments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_id INTEGER NOT NULL,
            content_version INTEGER NOT NULL,
            parent_location_id INTEGER NOT NULL,
            is_main INTEGER NOT NULL DEFAULT 0,
            op_code INTEGER NOT NULL,
            parent_remote_id TEXT NOT NULL DEFAULT '',
            priority INTEGER NOT NULL DEFAULT 0,
            sort_field INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL DEFAULT 1,
            is_hidden INTEGER NOT NULL DEFAULT 0
        )",
    ),
    (
        "trash",
        "CREATE TABLE IF NOT EXISTS trash (
            location_id INTEGER PRIMARY KEY,
            parent_id INTEGER,
            content_id INTEGER NOT NULL,
            content_version INTEGER NOT NULL,
            path_string TEXT NOT NULL,
            path_identification TEXT NOT NULL DEFAULT '',
            depth INTEGER NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            sort_field INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL DEFAULT 1,
            remote_id TEXT NOT NULL,
            is_hidden INTEGER NOT NULL DEFAULT 0,
            trashed_at TEXT NOT NULL
        )",
    ),
    (
        "idx_locations_path",
        "CREATE INDEX IF NOT EXISTS idx_locations_path ON locations(path_string)",
    ),
    (
        "idx_locations_parent",
        "CREATE INDEX IF NOT EXISTS idx_locations_parent ON locations(parent_id)",
    ),
    (
        "idx_locations_content",
        "CREATE INDEX IF NOT EXISTS idx_locations_content ON locations(content_id)",
    ),
    (
        "idx_assignments_content",
        "CREATE INDEX IF NOT EXISTS idx_assignments_content
         ON node_assignments(content_id, content_version)",
    ),
    (
        "idx_trash_content",
        "CREATE INDEX IF NOT EXISTS idx_trash_content ON trash(content_id)",
    ),
];

/// Database handle for the location tree
///
/// # Examples
///
/// ```no_run
/// use arbor_core::config::TreeConfig;
/// use arbor_core::db::TreeDatabase;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db = TreeDatabase::new(TreeConfig::with_database_path("./data/tree.db")).await?;
///     let conn = db.connect_with_timeout().await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct TreeDatabase {
    /// libsql database handle (wrapped in Arc for sharing)
    db: Arc<Database>,

    /// Path to the database file
    db_path: PathBuf,

    busy_timeout_ms: u64,
}

impl std::fmt::Debug for TreeDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeDatabase")
            .field("db_path", &self.db_path)
            .field("busy_timeout_ms", &self.busy_timeout_ms)
            .finish()
    }
}

impl TreeDatabase {
    /// Open (or create) the database described by `config`
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the configuration is invalid, the parent
    /// directory cannot be created, or connection/schema setup fails.
    pub async fn new(config: TreeConfig) -> Result<Self, DatabaseError> {
        config
            .validate()
            .map_err(DatabaseError::initialization_failed)?;

        let db_path = config.database_path;

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
            busy_timeout_ms: config.busy_timeout_ms,
        };

        service.initialize_schema().await?;
        tracing::info!("Tree database ready at {}", service.db_path.display());

        Ok(service)
    }

    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Raw connection without busy timeout
    ///
    /// Only for single-shot reads; anything that writes should use
    /// [`TreeDatabase::connect_with_timeout`].
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db
            .connect()
            .map_err(|e| DatabaseError::connection_failed(self.db_path.clone(), e))
    }

    /// Connection with the configured busy timeout
    ///
    /// Concurrent writers wait for each other's transactions instead of
    /// failing immediately when the database is locked.
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(
            &conn,
            &format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms),
        )
        .await?;

        Ok(conn)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Create tables and indexes
    ///
    /// Idempotent; safe to run against an existing database.
    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        for (name, statement) in SCHEMA_STATEMENTS {
            conn.execute(statement, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!("Failed to create '{}': {}", name, e))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_new_creates_parent_directory_and_schema() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("tree.db");

        let db = TreeDatabase::new(TreeConfig::with_database_path(&db_path))
            .await
            .unwrap();
        assert!(db_path.exists());

        let conn = db.connect_with_timeout().await.unwrap();
        let mut rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'locations'",
                (),
            )
            .await
            .unwrap();
        assert!(rows.next().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_schema_initialization_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let config = TreeConfig::with_database_path(temp_dir.path().join("tree.db"));

        TreeDatabase::new(config.clone()).await.unwrap();
        assert!(TreeDatabase::new(config).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = TreeConfig {
            event_channel_capacity: 0,
            ..TreeConfig::default()
        };
        let err = TreeDatabase::new(config).await.unwrap_err();
        assert!(matches!(err, DatabaseError::InitializationFailed(_)));
    }
}
