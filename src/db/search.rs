use super::models::{RefKind, SelectorKind};
use super::{Db, KbResult, serialize_vector};
use rusqlite::types::Value;

/// Restrict a search to one entity kind and/or one page's selectors.
#[derive(Debug, Default, Clone, Copy)]
pub struct SearchFilter<'a> {
    pub ref_kind: Option<RefKind>,
    /// Only meaningful for selector results; chunk rows are unaffected.
    pub page_id: Option<&'a str>,
}

/// One ranked knowledge fragment returned by a search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Chunk id or selector id, depending on `ref_kind`.
    pub ref_id: i64,
    pub ref_kind: RefKind,
    pub similarity: f64,
    /// Chunk text, or the selector's human-readable name.
    pub content: String,
    /// Document source name, or the selector's page id.
    pub origin: String,
    /// Present when `ref_kind` is `Selector`.
    pub selector: Option<SelectorMatch>,
}

#[derive(Debug, Clone)]
pub struct SelectorMatch {
    pub selector: String,
    pub kind: SelectorKind,
}

impl SearchResult {
    /// Citation id in the `kind:id` form the generator hands to the LLM.
    #[must_use]
    pub fn citation(&self) -> String {
        format!("{}:{}", self.ref_kind.as_str(), self.ref_id)
    }
}

fn map_search_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchResult> {
    let distance: f64 = row.get(2)?;
    let similarity = 1.0 - (distance / 2.0);

    let kind_str: String = row.get(0)?;
    let ref_kind = RefKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown ref kind: {kind_str}").into(),
        )
    })?;

    match ref_kind {
        RefKind::Chunk => Ok(SearchResult {
            ref_id: row.get(1)?,
            ref_kind,
            similarity,
            content: row.get(3)?,
            origin: row.get(4)?,
            selector: None,
        }),
        RefKind::Selector => {
            let sel_kind_str: String = row.get(7)?;
            let kind = SelectorKind::parse(&sel_kind_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    7,
                    rusqlite::types::Type::Text,
                    format!("unknown selector kind: {sel_kind_str}").into(),
                )
            })?;
            Ok(SearchResult {
                ref_id: row.get(1)?,
                ref_kind,
                similarity,
                content: row.get(5)?,
                origin: row.get(8)?,
                selector: Some(SelectorMatch {
                    selector: row.get(6)?,
                    kind,
                }),
            })
        }
    }
}

impl Db {
    /// Top-K cosine similarity search over the knowledge base.
    ///
    /// Results are ordered by descending similarity; ties break by embedding
    /// insertion order, earliest first. An empty index yields an empty Vec.
    pub fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: SearchFilter<'_>,
    ) -> KbResult<Vec<SearchResult>> {
        self.check_dimensions(query_vector)?;

        let mut query = String::from(
            r#"
            SELECT
                e.ref_kind,
                e.ref_id,
                vec_distance_cosine(v.embedding, ?) as distance,
                c.content,
                d.source_name,
                s.name,
                s.selector,
                s.kind,
                s.page_id
            FROM vec_refs v
            JOIN embeddings e ON v.rowid = e.id
            LEFT JOIN chunks c ON e.ref_kind = 'chunk' AND c.id = e.ref_id
            LEFT JOIN documents d ON c.document_id = d.id
            LEFT JOIN selectors s ON e.ref_kind = 'selector' AND s.id = e.ref_id
            "#,
        );

        let mut where_clauses = Vec::new();
        let mut params: Vec<Value> = vec![Value::Blob(serialize_vector(query_vector))];

        if let Some(kind) = filter.ref_kind {
            where_clauses.push("e.ref_kind = ?".to_string());
            params.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(page_id) = filter.page_id {
            where_clauses.push("(e.ref_kind != 'selector' OR s.page_id = ?)".to_string());
            params.push(Value::Text(page_id.to_string()));
        }

        if !where_clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&where_clauses.join(" AND "));
        }

        query.push_str(" ORDER BY distance ASC, e.id ASC LIMIT ?");
        params.push(Value::Integer(top_k as i64));

        let param_refs: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(param_refs.as_slice(), map_search_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{NewChunk, NewSelector};

    const DIMS: usize = 4;

    fn unit(x: f32, y: f32, z: f32, w: f32) -> Vec<f32> {
        let v = [x, y, z, w];
        let norm = v.iter().map(|a| a * a).sum::<f32>().sqrt();
        v.iter().map(|a| a / norm).collect()
    }

    fn seed(db: &mut Db) {
        let chunks = vec![NewChunk {
            ordinal: 0,
            content: "Checkout allows a discount code",
            span_start: 0,
            span_end: 31,
        }];
        db.insert_document(
            "requirements.md",
            "markdown",
            "Checkout allows a discount code",
            &chunks,
            &[unit(1.0, 0.0, 0.0, 0.0)],
        )
        .unwrap();

        let selectors = vec![NewSelector {
            name: "Add to Cart".to_string(),
            selector: "#add-product-1".to_string(),
            kind: SelectorKind::Click,
            position: 0,
        }];
        db.upsert_page_selectors("checkout.html", &selectors, &[unit(0.0, 1.0, 0.0, 0.0)])
            .unwrap();
    }

    #[test]
    fn test_search_ranks_by_similarity() {
        let mut db = Db::open_in_memory(DIMS).unwrap();
        seed(&mut db);

        let results = db
            .search(&unit(1.0, 0.1, 0.0, 0.0), 5, SearchFilter::default())
            .unwrap();
        assert_eq!(results.len(), 2);

        assert_eq!(results[0].ref_kind, RefKind::Chunk);
        assert_eq!(results[0].origin, "requirements.md");
        assert!(results[0].similarity > 0.9);
        assert!(results[0].selector.is_none());

        assert_eq!(results[1].ref_kind, RefKind::Selector);
        assert_eq!(results[1].origin, "checkout.html");
        let sel = results[1].selector.as_ref().unwrap();
        assert_eq!(sel.selector, "#add-product-1");
        assert_eq!(sel.kind, SelectorKind::Click);
        assert_eq!(results[1].content, "Add to Cart");
    }

    #[test]
    fn test_search_kind_filter() {
        let mut db = Db::open_in_memory(DIMS).unwrap();
        seed(&mut db);

        let only_chunks = db
            .search(
                &unit(0.0, 1.0, 0.0, 0.0),
                5,
                SearchFilter {
                    ref_kind: Some(RefKind::Chunk),
                    page_id: None,
                },
            )
            .unwrap();
        assert_eq!(only_chunks.len(), 1);
        assert_eq!(only_chunks[0].ref_kind, RefKind::Chunk);

        let only_selectors = db
            .search(
                &unit(0.0, 1.0, 0.0, 0.0),
                5,
                SearchFilter {
                    ref_kind: Some(RefKind::Selector),
                    page_id: Some("checkout.html"),
                },
            )
            .unwrap();
        assert_eq!(only_selectors.len(), 1);
        assert_eq!(only_selectors[0].citation(), format!("selector:{}", only_selectors[0].ref_id));

        let other_page = db
            .search(
                &unit(0.0, 1.0, 0.0, 0.0),
                5,
                SearchFilter {
                    ref_kind: Some(RefKind::Selector),
                    page_id: Some("other.html"),
                },
            )
            .unwrap();
        assert!(other_page.is_empty());
    }

    #[test]
    fn test_search_empty_index_returns_empty() {
        let db = Db::open_in_memory(DIMS).unwrap();
        let results = db
            .search(&unit(1.0, 0.0, 0.0, 0.0), 5, SearchFilter::default())
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_search_tie_break_by_insertion_order() {
        let mut db = Db::open_in_memory(DIMS).unwrap();
        // Two documents with identical vectors: earlier insertion wins the tie
        let v = unit(1.0, 0.0, 0.0, 0.0);
        db.insert_document(
            "first.md",
            "markdown",
            "alpha",
            &[NewChunk {
                ordinal: 0,
                content: "alpha",
                span_start: 0,
                span_end: 5,
            }],
            &[v.clone()],
        )
        .unwrap();
        db.insert_document(
            "second.md",
            "markdown",
            "beta",
            &[NewChunk {
                ordinal: 0,
                content: "beta",
                span_start: 0,
                span_end: 4,
            }],
            &[v.clone()],
        )
        .unwrap();

        let results = db.search(&v, 2, SearchFilter::default()).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].origin, "first.md");
        assert_eq!(results[1].origin, "second.md");
    }

    #[test]
    fn test_search_rejects_wrong_dimension() {
        let db = Db::open_in_memory(DIMS).unwrap();
        assert!(db.search(&[0.0; 3], 5, SearchFilter::default()).is_err());
    }

    #[test]
    fn test_search_respects_top_k() {
        let mut db = Db::open_in_memory(DIMS).unwrap();
        for i in 0..5 {
            db.insert_document(
                &format!("doc{i}.md"),
                "markdown",
                "text",
                &[NewChunk {
                    ordinal: 0,
                    content: "text",
                    span_start: 0,
                    span_end: 4,
                }],
                &[unit(1.0, i as f32 * 0.1, 0.0, 0.0)],
            )
            .unwrap();
        }
        let results = db
            .search(&unit(1.0, 0.0, 0.0, 0.0), 3, SearchFilter::default())
            .unwrap();
        assert_eq!(results.len(), 3);
    }
}
