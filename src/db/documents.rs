use super::models::{Document, NewChunk};
use super::{Db, KbResult, l2_norm, serialize_vector};
use rusqlite::{OptionalExtension, params};

impl Db {
    /// Insert or replace a document with its chunks and embeddings.
    ///
    /// Idempotent per `source_name`: re-ingesting replaces the prior document,
    /// its chunks, and their embedding records in one transaction. Returns the
    /// stable document id.
    pub fn insert_document(
        &mut self,
        source_name: &str,
        content_type: &str,
        raw_text: &str,
        chunks: &[NewChunk<'_>],
        embeddings: &[Vec<f32>],
    ) -> KbResult<i64> {
        assert_eq!(
            chunks.len(),
            embeddings.len(),
            "chunks and embeddings length mismatch"
        );
        for vector in embeddings {
            self.check_dimensions(vector)?;
        }

        let tx = self.conn.transaction()?;

        let doc_id: i64 = tx.query_row(
            r#"
            INSERT INTO documents (source_name, content_type, raw_text, indexed_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(source_name) DO UPDATE SET
                content_type = excluded.content_type,
                raw_text = excluded.raw_text,
                indexed_at = CURRENT_TIMESTAMP
            RETURNING id
            "#,
            params![source_name, content_type, raw_text],
            |row| row.get(0),
        )?;

        // Remove prior chunks and their embedding records (re-ingestion)
        tx.execute(
            "DELETE FROM vec_refs WHERE rowid IN \
             (SELECT e.id FROM embeddings e JOIN chunks c ON e.ref_id = c.id \
              WHERE e.ref_kind = 'chunk' AND c.document_id = ?)",
            params![doc_id],
        )?;
        tx.execute(
            "DELETE FROM embeddings WHERE ref_kind = 'chunk' AND ref_id IN \
             (SELECT id FROM chunks WHERE document_id = ?)",
            params![doc_id],
        )?;
        tx.execute("DELETE FROM chunks WHERE document_id = ?", params![doc_id])?;

        for (i, chunk) in chunks.iter().enumerate() {
            tx.execute(
                "INSERT INTO chunks (document_id, ordinal, content, span_start, span_end) \
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    doc_id,
                    chunk.ordinal as i64,
                    chunk.content,
                    chunk.span_start as i64,
                    chunk.span_end as i64
                ],
            )?;
            let chunk_id = tx.last_insert_rowid();

            let emb_id: i64 = tx.query_row(
                "INSERT INTO embeddings (ref_kind, ref_id, norm) VALUES ('chunk', ?, ?) \
                 RETURNING id",
                params![chunk_id, l2_norm(&embeddings[i])],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO vec_refs (rowid, embedding) VALUES (?, ?)",
                params![emb_id, serialize_vector(&embeddings[i])],
            )?;
        }

        tx.commit()?;
        Ok(doc_id)
    }

    /// List all indexed documents in insertion order.
    pub fn list_documents(&self) -> KbResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source_name, content_type, indexed_at FROM documents ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Document {
                id: row.get(0)?,
                source_name: row.get(1)?,
                content_type: row.get(2)?,
                indexed_at: row.get(3)?,
            })
        })?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(row?);
        }
        Ok(docs)
    }

    /// Delete a document together with its chunks and embedding records.
    /// Returns `false` when no document with that source name exists.
    pub fn delete_document(&mut self, source_name: &str) -> KbResult<bool> {
        let doc_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM documents WHERE source_name = ?",
                params![source_name],
                |row| row.get(0),
            )
            .optional()?;

        let Some(doc_id) = doc_id else {
            return Ok(false);
        };

        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM vec_refs WHERE rowid IN \
             (SELECT e.id FROM embeddings e JOIN chunks c ON e.ref_id = c.id \
              WHERE e.ref_kind = 'chunk' AND c.document_id = ?)",
            params![doc_id],
        )?;
        tx.execute(
            "DELETE FROM embeddings WHERE ref_kind = 'chunk' AND ref_id IN \
             (SELECT id FROM chunks WHERE document_id = ?)",
            params![doc_id],
        )?;
        // Cascade deletes chunks
        let rows = tx.execute("DELETE FROM documents WHERE id = ?", params![doc_id])?;
        tx.commit()?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::KbError;

    fn chunk<'a>(ordinal: usize, content: &'a str, start: usize, end: usize) -> NewChunk<'a> {
        NewChunk {
            ordinal,
            content,
            span_start: start,
            span_end: end,
        }
    }

    #[test]
    fn test_documents_crud() {
        let mut db = Db::open_in_memory(4).unwrap();

        let chunks = vec![chunk(0, "Hello", 0, 5), chunk(1, "World", 3, 8)];
        let embeddings = vec![vec![0.1; 4], vec![0.2; 4]];

        db.insert_document("spec.md", "markdown", "HelloWorld", &chunks, &embeddings)
            .unwrap();

        let docs = db.list_documents().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source_name, "spec.md");
        assert_eq!(docs[0].content_type, "markdown");

        let chunk_count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(chunk_count, 2);

        let emb_count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(emb_count, 2);

        // Re-ingest replaces chunks and embeddings
        let new_chunks = vec![chunk(0, "Replaced", 0, 8)];
        let new_embeddings = vec![vec![0.5; 4]];
        db.insert_document("spec.md", "markdown", "Replaced", &new_chunks, &new_embeddings)
            .unwrap();

        let chunk_count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(chunk_count, 1);

        let vec_count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM vec_refs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(vec_count, 1);

        // Delete
        assert!(db.delete_document("spec.md").unwrap());
        assert!(!db.delete_document("spec.md").unwrap());
        assert_eq!(db.list_documents().unwrap().len(), 0);

        let emb_count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(emb_count, 0);
    }

    #[test]
    fn test_insert_rejects_wrong_dimension() {
        let mut db = Db::open_in_memory(4).unwrap();
        let chunks = vec![chunk(0, "Hello", 0, 5)];
        let embeddings = vec![vec![0.1; 3]];

        let err = db
            .insert_document("bad.md", "markdown", "Hello", &chunks, &embeddings)
            .unwrap_err();
        assert!(matches!(err, KbError::DimensionMismatch { expected: 4, got: 3 }));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut db = Db::open_in_memory(4).unwrap();
        let chunks = vec![chunk(0, "Hello", 0, 5)];
        db.insert_document("a.md", "markdown", "Hello", &chunks, &[vec![0.1; 4]])
            .unwrap();

        db.reset().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.document_count, 0);
        assert_eq!(stats.chunk_count, 0);
        assert_eq!(stats.selector_count, 0);
    }

    #[test]
    fn test_stats() {
        let mut db = Db::open_in_memory(4).unwrap();
        db.insert_document(
            "a.md",
            "markdown",
            "Hello",
            &[chunk(0, "Hello", 0, 5)],
            &[vec![0.1; 4]],
        )
        .unwrap();
        db.insert_document(
            "b.txt",
            "text",
            "World",
            &[chunk(0, "World", 0, 5)],
            &[vec![0.2; 4]],
        )
        .unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.document_count, 2);
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.sources, vec!["a.md", "b.txt"]);
    }
}
