//! Embedded-database backend.
//!
//! One logical table keyed by the backend-relative path. Metadata is stored
//! as an opaque JSON blob; directory listings and searches are computed by
//! scanning keys under a prefix. No revision history is kept.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::node::{Node, NodeKind, NodeMetadata};
use crate::storage_traits::{
    first_segment, subtree_prefix, validate_key, SearchFilter, StorageBackend,
};
use crate::StateResult;

/// `(path, node_type, content, metadata)` as stored.
type NodeRow = (String, String, Option<String>, String);

const PRAGMAS: &str = "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;";

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    key       TEXT PRIMARY KEY,
    path      TEXT NOT NULL,
    node_type TEXT NOT NULL,
    content   TEXT,
    metadata  TEXT NOT NULL
);
";

/// SQLite-backed [`StorageBackend`].
///
/// rusqlite connections are not `Sync`; access is serialized through a
/// `parking_lot::Mutex`.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteBackend {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StateResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(PRAGMAS)?;
        conn.execute_batch(CREATE_TABLES)?;

        info!(path = %path.display(), "node database opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_owned(),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> StateResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored nodes.
    pub fn len(&self) -> StateResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> StateResult<bool> {
        Ok(self.len()? == 0)
    }

    fn row_fields(row: &Row<'_>) -> rusqlite::Result<NodeRow> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }

    fn decode((path, node_type, content, metadata): NodeRow) -> StateResult<Node> {
        let kind: NodeKind = node_type.parse()?;
        let metadata: NodeMetadata = serde_json::from_str(&metadata)?;
        Ok(Node {
            path,
            kind,
            metadata,
            content,
        })
    }

    /// Rows whose key starts with `prefix`, ordered by key.
    fn scan(&self, prefix: &str) -> StateResult<Vec<(String, NodeRow)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT key, path, node_type, content, metadata FROM nodes
             WHERE substr(key, 1, length(?1)) = ?1
             ORDER BY key",
        )?;
        let rows = stmt
            .query_map(params![prefix], |row| {
                let key: String = row.get(0)?;
                Ok((key, (row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl StorageBackend for SqliteBackend {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn read(&self, path: &str) -> StateResult<Option<Node>> {
        let key = validate_key(path, true)?;
        if key.is_empty() {
            return Ok(None);
        }
        let row = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT path, node_type, content, metadata FROM nodes WHERE key = ?1",
                params![key],
                Self::row_fields,
            )
            .optional()?
        };
        row.map(Self::decode).transpose()
    }

    fn write(&self, path: &str, node: &Node) -> StateResult<()> {
        let key = validate_key(path, false)?;
        let metadata = serde_json::to_string(&node.metadata)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO nodes (key, path, node_type, content, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key) DO UPDATE SET
                path = excluded.path,
                node_type = excluded.node_type,
                content = excluded.content,
                metadata = excluded.metadata",
            params![key, node.path, node.kind.as_str(), node.content, metadata],
        )?;
        debug!(key = %key, version = node.metadata.version, "node upserted");
        Ok(())
    }

    fn list(&self, path: &str) -> StateResult<Vec<String>> {
        let key = validate_key(path, true)?;
        let prefix = subtree_prefix(&key);
        let names: BTreeSet<String> = self
            .scan(&prefix)?
            .iter()
            .filter_map(|(k, _)| first_segment(k, &prefix).map(str::to_string))
            .collect();
        Ok(names.into_iter().collect())
    }

    fn delete(&self, path: &str) -> StateResult<bool> {
        let key = validate_key(path, true)?;
        if key.is_empty() {
            return Ok(false);
        }
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM nodes WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    fn search(&self, path: &str, filter: &SearchFilter) -> StateResult<Vec<Node>> {
        let key = validate_key(path, true)?;
        let prefix = subtree_prefix(&key);
        let mut results = Vec::new();
        for (_, row) in self.scan(&prefix)? {
            let node = Self::decode(row)?;
            if filter.matches(&node) {
                results.push(node);
            }
        }
        Ok(results)
    }
}
