//! Knowledge base storage using SQLite and sqlite-vec.
//!
//! One database holds the four entity types of the knowledge base: documents,
//! chunks, selector descriptors, and embedding records. Embedding vectors live
//! in a `vec0` virtual table whose rowid equals the embedding record id, so the
//! autoincrement id doubles as global insertion order for search tie-breaking.
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;
use thiserror::Error;
use tracing::info;

pub mod documents;
pub mod models;
pub mod search;
pub mod selectors;

/// Errors from knowledge base operations.
#[derive(Error, Debug)]
pub enum KbError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

pub type KbResult<T> = Result<T, KbError>;

fn schema_sql(dimensions: usize) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_name TEXT NOT NULL UNIQUE,
    content_type TEXT NOT NULL,
    raw_text TEXT NOT NULL,
    indexed_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL,
    ordinal INTEGER NOT NULL,
    content TEXT NOT NULL,
    span_start INTEGER NOT NULL,
    span_end INTEGER NOT NULL,
    FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_chunk_document ON chunks(document_id);

CREATE TABLE IF NOT EXISTS selectors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id TEXT NOT NULL,
    name TEXT NOT NULL,
    selector TEXT NOT NULL,
    kind TEXT NOT NULL,
    position INTEGER NOT NULL,
    UNIQUE(page_id, selector)
);

CREATE INDEX IF NOT EXISTS idx_selector_page ON selectors(page_id);

CREATE TABLE IF NOT EXISTS embeddings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ref_kind TEXT NOT NULL,
    ref_id INTEGER NOT NULL,
    norm REAL NOT NULL,
    UNIQUE(ref_kind, ref_id)
);

CREATE VIRTUAL TABLE IF NOT EXISTS vec_refs USING vec0(
    embedding FLOAT[{dimensions}]
);
"#
    )
}

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// A wrapper around a SQLite connection initialized with sqlite-vec and the
/// knowledge base schema.
pub struct Db {
    pub(crate) conn: Connection,
    dimensions: usize,
}

impl Db {
    /// Open a database at the given path and initialize the schema for
    /// vectors of the given dimensionality.
    pub fn open<P: AsRef<Path>>(path: P, dimensions: usize) -> KbResult<Self> {
        let path = path.as_ref();
        info!("Initializing knowledge base: {}", path.display());

        init_sqlite_vec();
        let conn = Connection::open(path)?;
        Self::configure(conn, dimensions)
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory(dimensions: usize) -> KbResult<Self> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        Self::configure(conn, dimensions)
    }

    fn configure(conn: Connection, dimensions: usize) -> KbResult<Self> {
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        info!("sqlite-vec version: {}", vec_version);

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(&schema_sql(dimensions))?;

        Ok(Self { conn, dimensions })
    }

    /// Vector dimensionality this knowledge base was opened with.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Reject vectors whose dimension does not match the index.
    pub(crate) fn check_dimensions(&self, vector: &[f32]) -> KbResult<()> {
        if vector.len() != self.dimensions {
            return Err(KbError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        Ok(())
    }

    /// Clear all knowledge base entities: documents, chunks, selectors, and
    /// embedding records. The schema stays in place so `build` can re-run.
    pub fn reset(&mut self) -> KbResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM vec_refs", [])?;
        tx.execute("DELETE FROM embeddings", [])?;
        tx.execute("DELETE FROM selectors", [])?;
        tx.execute("DELETE FROM chunks", [])?;
        tx.execute("DELETE FROM documents", [])?;
        tx.commit()?;
        info!("Knowledge base reset");
        Ok(())
    }

    /// Knowledge base statistics for the stats command.
    pub fn stats(&self) -> KbResult<KbStats> {
        let document_count: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        let chunk_count: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        let selector_count: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM selectors", [], |row| row.get(0))?;

        let mut stmt = self
            .conn
            .prepare("SELECT source_name FROM documents ORDER BY id")?;
        let sources = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT page_id FROM selectors ORDER BY page_id")?;
        let pages = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(KbStats {
            document_count,
            chunk_count,
            selector_count,
            sources,
            pages,
        })
    }
}

/// Aggregate counts over the knowledge base.
#[derive(Debug, serde::Serialize)]
pub struct KbStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub selector_count: usize,
    pub sources: Vec<String>,
    pub pages: Vec<String>,
}

/// Helper to serialize a float32 vector into bytes for the vec0 virtual table.
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// L2 norm, stored alongside each embedding record.
pub(crate) fn l2_norm(vec: &[f32]) -> f64 {
    vec.iter().map(|v| (*v as f64) * (*v as f64)).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_init() {
        let db = Db::open_in_memory(8).expect("Failed to open in-memory DB");

        let tables: usize = db.conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN ('documents', 'chunks', 'selectors', 'embeddings', 'vec_refs');",
            [],
            |row| row.get(0),
        ).unwrap();

        assert_eq!(tables, 5);
        assert_eq!(db.dimensions(), 8);
    }

    #[test]
    fn test_serialize_vector() {
        let vec = vec![1.0, 2.0, -3.5];
        let bytes = serialize_vector(&vec);
        assert_eq!(bytes.len(), 12);

        // 1.0f32 in hex: 0x3f800000 -> little endian: 00 00 80 3f
        assert_eq!(&bytes[0..4], &[0x00, 0x00, 0x80, 0x3f]);
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x00, 0x40]);
        assert_eq!(&bytes[8..12], &[0x00, 0x00, 0x60, 0xc0]);
    }

    #[test]
    fn test_dimension_check() {
        let db = Db::open_in_memory(4).unwrap();
        assert!(db.check_dimensions(&[0.0; 4]).is_ok());
        let err = db.check_dimensions(&[0.0; 3]).unwrap_err();
        match err {
            KbError::DimensionMismatch { expected, got } => {
                assert_eq!(expected, 4);
                assert_eq!(got, 3);
            }
            other => panic!("expected DimensionMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_l2_norm() {
        assert!((l2_norm(&[3.0, 4.0]) - 5.0).abs() < 1e-9);
    }
}
