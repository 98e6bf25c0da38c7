//! SQLite storage backend
//!
//! The schema follows the shape of a WordPress term store: attachments live in
//! `assets`, taxonomy terms in `terms` (parent `0` meaning top level), and
//! `term_relationships` links the two.

use super::traits::{OpenStore, RelationshipSet, StorageError, StorageResult, TermStore, TermTransaction};
use crate::taxonomy::{AssetId, AssetRecord, TermNode};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Taxonomy used when none is configured
pub const DEFAULT_TAXONOMY: &str = "media_category";

/// SQLite-backed term store
///
/// Thread-safe via internal mutex on the connection. A write transaction holds
/// the lock until it commits or is dropped.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    taxonomy: String,
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- Content-library entries
            CREATE TABLE IF NOT EXISTS assets (
                id INTEGER PRIMARY KEY,
                guid TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                post_type TEXT NOT NULL DEFAULT 'attachment'
            );

            -- Taxonomy terms (base schema - count added via migration)
            CREATE TABLE IF NOT EXISTS terms (
                term_id INTEGER PRIMARY KEY AUTOINCREMENT,
                taxonomy TEXT NOT NULL,
                name TEXT NOT NULL,
                slug TEXT NOT NULL,
                parent INTEGER NOT NULL DEFAULT 0
            );

            -- (name, parent) is unique within a taxonomy
            CREATE UNIQUE INDEX IF NOT EXISTS idx_terms_name_parent
                ON terms(taxonomy, name COLLATE NOCASE, parent);

            CREATE TABLE IF NOT EXISTS term_relationships (
                object_id INTEGER NOT NULL,
                term_id INTEGER NOT NULL,
                PRIMARY KEY (object_id, term_id),
                FOREIGN KEY (object_id) REFERENCES assets(id) ON DELETE CASCADE,
                FOREIGN KEY (term_id) REFERENCES terms(term_id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_relationships_term
                ON term_relationships(term_id);

            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- WAL keeps readers unblocked while the apply transaction runs
            PRAGMA journal_mode = WAL;
            "#,
        )?;

        Self::migrate_add_count(conn)?;

        Ok(())
    }

    /// Migration: add the usage `count` column to databases created without it
    ///
    /// SQLite doesn't support ALTER TABLE ADD COLUMN IF NOT EXISTS,
    /// so we check if the column exists first using table_info pragma.
    fn migrate_add_count(conn: &Connection) -> StorageResult<()> {
        let has_count: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('terms') WHERE name = 'count'",
            [],
            |row| row.get(0),
        )?;

        if !has_count {
            conn.execute("ALTER TABLE terms ADD COLUMN count INTEGER NOT NULL DEFAULT 0", [])?;
        }

        Ok(())
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            taxonomy: DEFAULT_TAXONOMY.to_string(),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Lock)
    }

    /// Scope reads and writes to another taxonomy
    pub fn with_taxonomy(mut self, taxonomy: impl Into<String>) -> Self {
        self.taxonomy = taxonomy.into();
        self
    }

    pub fn taxonomy(&self) -> &str {
        &self.taxonomy
    }

    /// Insert or replace an attachment
    pub fn insert_asset(&self, id: i64, guid: &str, title: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO assets (id, guid, title, post_type)
            VALUES (?1, ?2, ?3, 'attachment')
            ON CONFLICT(id) DO UPDATE SET
                guid = excluded.guid,
                title = excluded.title
            "#,
            params![id, guid, title],
        )?;
        Ok(())
    }

    /// Insert a term outside any transaction (seeding, imports)
    pub fn insert_term(&self, name: &str, parent: Option<i64>) -> StorageResult<i64> {
        let conn = self.conn()?;
        insert_term(&conn, &self.taxonomy, name, parent)
    }

    /// Stored usage count of a term
    pub fn term_count(&self, term: i64) -> StorageResult<i64> {
        let conn = self.conn()?;
        conn.query_row("SELECT count FROM terms WHERE term_id = ?1", params![term], |row| row.get(0))
            .optional()?
            .ok_or(StorageError::TermNotFound(term))
    }

    /// Row id of a term by name under a parent
    pub fn find_term(&self, name: &str, parent: Option<i64>) -> StorageResult<Option<i64>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT term_id FROM terms WHERE taxonomy = ?1 AND name = ?2 COLLATE NOCASE AND parent = ?3",
                params![self.taxonomy, name, parent.unwrap_or(0)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Number of terms in the configured taxonomy
    pub fn term_total(&self) -> StorageResult<usize> {
        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM terms WHERE taxonomy = ?1",
            params![self.taxonomy],
            |row| row.get(0),
        )?;
        Ok(total as usize)
    }

    /// Term ids related to one asset, ascending
    pub fn terms_of(&self, asset: AssetId) -> StorageResult<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT term_id FROM term_relationships WHERE object_id = ?1 ORDER BY term_id",
        )?;
        let ids = stmt
            .query_map(params![asset.0], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }
}

/// Lowercase, spaces to dashes, '&' spelled out
pub fn slugify(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-").replace('&', "and")
}

fn insert_term(conn: &Connection, taxonomy: &str, name: &str, parent: Option<i64>) -> StorageResult<i64> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO terms (taxonomy, name, slug, parent, count) VALUES (?1, ?2, ?3, ?4, 0)",
    )?;
    stmt.execute(params![taxonomy, name, slugify(name), parent.unwrap_or(0)])?;
    Ok(conn.last_insert_rowid())
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        Self::from_connection(Connection::open(path)?)
    }

    fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }
}

impl TermStore for SqliteStore {
    fn load_terms(&self) -> StorageResult<Vec<TermNode>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT term_id, name, parent FROM terms WHERE taxonomy = ?1 ORDER BY term_id",
        )?;
        let terms = stmt
            .query_map(params![self.taxonomy], |row| {
                let parent: i64 = row.get(2)?;
                Ok(TermNode::stored(row.get(0)?, row.get::<_, String>(1)?, (parent != 0).then_some(parent)))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(terms)
    }

    fn load_assets(&self, limit: Option<usize>) -> StorageResult<Vec<AssetRecord>> {
        let conn = self.conn()?;
        // SQLite treats a negative LIMIT as no limit
        let limit = limit.map_or(-1, |n| n as i64);
        let mut stmt = conn.prepare(
            "SELECT id, guid, title FROM assets WHERE post_type = 'attachment' ORDER BY id LIMIT ?1",
        )?;
        let assets = stmt
            .query_map(params![limit], |row| {
                let guid: String = row.get(1)?;
                Ok(AssetRecord::from_guid(row.get::<_, i64>(0)?, &guid, row.get::<_, String>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(assets)
    }

    fn load_relationships(&self) -> StorageResult<RelationshipSet> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT r.object_id, r.term_id
             FROM term_relationships r JOIN terms t ON t.term_id = r.term_id
             WHERE t.taxonomy = ?1",
        )?;
        let pairs = stmt
            .query_map(params![self.taxonomy], |row| {
                Ok((AssetId(row.get(0)?), row.get::<_, i64>(1)?))
            })?
            .collect::<Result<RelationshipSet, _>>()?;
        Ok(pairs)
    }

    fn begin(&self) -> StorageResult<Box<dyn TermTransaction + '_>> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        debug!(taxonomy = %self.taxonomy, "transaction opened");
        Ok(Box::new(SqliteTransaction {
            conn,
            taxonomy: &self.taxonomy,
            finished: false,
        }))
    }
}

/// Write transaction holding the connection lock
struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    taxonomy: &'a str,
    finished: bool,
}

impl TermTransaction for SqliteTransaction<'_> {
    fn create_term(&mut self, name: &str, parent: Option<i64>) -> StorageResult<i64> {
        insert_term(&self.conn, self.taxonomy, name, parent)
    }

    fn relate(&mut self, asset: AssetId, term: i64) -> StorageResult<bool> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO term_relationships (object_id, term_id) VALUES (?1, ?2)
             ON CONFLICT(object_id, term_id) DO NOTHING",
        )?;
        let rows = stmt.execute(params![asset.0, term])?;
        Ok(rows > 0)
    }

    fn recount(&mut self, terms: &[i64]) -> StorageResult<()> {
        let mut stmt = self.conn.prepare_cached(
            "UPDATE terms SET count = (SELECT COUNT(*) FROM term_relationships WHERE term_id = ?1)
             WHERE term_id = ?1",
        )?;
        for &term in terms {
            if stmt.execute(params![term])? == 0 {
                return Err(StorageError::TermNotFound(term));
            }
        }
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> StorageResult<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        debug!("transaction committed");
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match self.conn.execute_batch("ROLLBACK") {
            Ok(()) => debug!("transaction rolled back"),
            Err(e) => warn!(error = %e, "rollback failed"),
        }
    }
}
