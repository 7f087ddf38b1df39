use super::models::{NewSelector, SelectorDescriptor, SelectorKind};
use super::{Db, KbResult, l2_norm, serialize_vector};
use rusqlite::params;
use std::collections::HashSet;

impl Db {
    /// Insert or replace the selector set of a page, with one embedding per
    /// descriptor.
    ///
    /// Idempotent per `(page_id, selector)`: a descriptor that already exists
    /// keeps its row id (and therefore its embedding insertion order), only
    /// its name, kind, position, vector, and norm are updated. Descriptors no
    /// longer present in the new set are removed together with their
    /// embedding records.
    pub fn upsert_page_selectors(
        &mut self,
        page_id: &str,
        selectors: &[NewSelector],
        embeddings: &[Vec<f32>],
    ) -> KbResult<Vec<i64>> {
        assert_eq!(
            selectors.len(),
            embeddings.len(),
            "selectors and embeddings length mismatch"
        );
        for vector in embeddings {
            self.check_dimensions(vector)?;
        }

        let tx = self.conn.transaction()?;

        // Drop descriptors that disappeared from the page
        let keep: HashSet<&str> = selectors.iter().map(|s| s.selector.as_str()).collect();
        let stale: Vec<i64> = {
            let mut stmt =
                tx.prepare("SELECT id, selector FROM selectors WHERE page_id = ?")?;
            let rows = stmt.query_map(params![page_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut stale = Vec::new();
            for row in rows {
                let (id, selector) = row?;
                if !keep.contains(selector.as_str()) {
                    stale.push(id);
                }
            }
            stale
        };
        for id in &stale {
            tx.execute(
                "DELETE FROM vec_refs WHERE rowid IN \
                 (SELECT id FROM embeddings WHERE ref_kind = 'selector' AND ref_id = ?)",
                params![id],
            )?;
            tx.execute(
                "DELETE FROM embeddings WHERE ref_kind = 'selector' AND ref_id = ?",
                params![id],
            )?;
            tx.execute("DELETE FROM selectors WHERE id = ?", params![id])?;
        }

        let mut ids = Vec::with_capacity(selectors.len());
        for (i, sel) in selectors.iter().enumerate() {
            let sel_id: i64 = tx.query_row(
                r#"
                INSERT INTO selectors (page_id, name, selector, kind, position)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(page_id, selector) DO UPDATE SET
                    name = excluded.name,
                    kind = excluded.kind,
                    position = excluded.position
                RETURNING id
                "#,
                params![
                    page_id,
                    sel.name,
                    sel.selector,
                    sel.kind.as_str(),
                    sel.position as i64
                ],
                |row| row.get(0),
            )?;

            let emb_id: i64 = tx.query_row(
                r#"
                INSERT INTO embeddings (ref_kind, ref_id, norm) VALUES ('selector', ?, ?)
                ON CONFLICT(ref_kind, ref_id) DO UPDATE SET norm = excluded.norm
                RETURNING id
                "#,
                params![sel_id, l2_norm(&embeddings[i])],
                |row| row.get(0),
            )?;
            tx.execute("DELETE FROM vec_refs WHERE rowid = ?", params![emb_id])?;
            tx.execute(
                "INSERT INTO vec_refs (rowid, embedding) VALUES (?, ?)",
                params![emb_id, serialize_vector(&embeddings[i])],
            )?;

            ids.push(sel_id);
        }

        tx.commit()?;
        Ok(ids)
    }

    /// All selector descriptors for a page, in document order.
    pub fn selectors_for_page(&self, page_id: &str) -> KbResult<Vec<SelectorDescriptor>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, page_id, name, selector, kind, position FROM selectors \
             WHERE page_id = ? ORDER BY position",
        )?;
        let rows = stmt.query_map(params![page_id], map_selector_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Delete all selectors (and their embeddings) for a page.
    /// Returns `false` when the page has no selectors.
    pub fn delete_page(&mut self, page_id: &str) -> KbResult<bool> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM vec_refs WHERE rowid IN \
             (SELECT e.id FROM embeddings e JOIN selectors s ON e.ref_id = s.id \
              WHERE e.ref_kind = 'selector' AND s.page_id = ?)",
            params![page_id],
        )?;
        tx.execute(
            "DELETE FROM embeddings WHERE ref_kind = 'selector' AND ref_id IN \
             (SELECT id FROM selectors WHERE page_id = ?)",
            params![page_id],
        )?;
        let rows = tx.execute("DELETE FROM selectors WHERE page_id = ?", params![page_id])?;
        tx.commit()?;
        Ok(rows > 0)
    }
}

fn map_selector_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SelectorDescriptor> {
    let kind_str: String = row.get(4)?;
    let kind = SelectorKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown selector kind: {kind_str}").into(),
        )
    })?;
    Ok(SelectorDescriptor {
        id: row.get(0)?,
        page_id: row.get(1)?,
        name: row.get(2)?,
        selector: row.get(3)?,
        kind,
        position: row.get::<_, i64>(5)? as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(name: &str, selector: &str, kind: SelectorKind, position: usize) -> NewSelector {
        NewSelector {
            name: name.to_string(),
            selector: selector.to_string(),
            kind,
            position,
        }
    }

    #[test]
    fn test_upsert_and_list() {
        let mut db = Db::open_in_memory(4).unwrap();
        let selectors = vec![
            sel("Add to Cart", "#add-product-1", SelectorKind::Click, 0),
            sel("Email", "#email", SelectorKind::Input, 1),
        ];
        let embeddings = vec![vec![0.1; 4], vec![0.2; 4]];

        let ids = db
            .upsert_page_selectors("checkout.html", &selectors, &embeddings)
            .unwrap();
        assert_eq!(ids.len(), 2);

        let listed = db.selectors_for_page("checkout.html").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "Add to Cart");
        assert_eq!(listed[0].selector, "#add-product-1");
        assert_eq!(listed[0].kind, SelectorKind::Click);
        assert_eq!(listed[1].kind, SelectorKind::Input);

        // Unknown page is empty, not an error
        assert!(db.selectors_for_page("other.html").unwrap().is_empty());
    }

    #[test]
    fn test_upsert_is_idempotent_per_selector() {
        let mut db = Db::open_in_memory(4).unwrap();
        let selectors = vec![sel("Add to Cart", "#add-product-1", SelectorKind::Click, 0)];
        let ids_a = db
            .upsert_page_selectors("checkout.html", &selectors, &[vec![0.1; 4]])
            .unwrap();

        // Same selector, updated name — keeps its row id
        let renamed = vec![sel("Add Product", "#add-product-1", SelectorKind::Click, 0)];
        let ids_b = db
            .upsert_page_selectors("checkout.html", &renamed, &[vec![0.3; 4]])
            .unwrap();
        assert_eq!(ids_a, ids_b);

        let listed = db.selectors_for_page("checkout.html").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Add Product");

        let emb_count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(emb_count, 1);
    }

    #[test]
    fn test_upsert_drops_stale_selectors() {
        let mut db = Db::open_in_memory(4).unwrap();
        let selectors = vec![
            sel("Add to Cart", "#add-product-1", SelectorKind::Click, 0),
            sel("Email", "#email", SelectorKind::Input, 1),
        ];
        db.upsert_page_selectors("checkout.html", &selectors, &[vec![0.1; 4], vec![0.2; 4]])
            .unwrap();

        // Re-ingest with #email gone
        let reduced = vec![sel("Add to Cart", "#add-product-1", SelectorKind::Click, 0)];
        db.upsert_page_selectors("checkout.html", &reduced, &[vec![0.1; 4]])
            .unwrap();

        let listed = db.selectors_for_page("checkout.html").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].selector, "#add-product-1");

        let vec_count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM vec_refs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(vec_count, 1);
    }

    #[test]
    fn test_pages_are_scoped() {
        let mut db = Db::open_in_memory(4).unwrap();
        db.upsert_page_selectors(
            "a.html",
            &[sel("Go", "#go", SelectorKind::Click, 0)],
            &[vec![0.1; 4]],
        )
        .unwrap();
        db.upsert_page_selectors(
            "b.html",
            &[sel("Go", "#go", SelectorKind::Click, 0)],
            &[vec![0.2; 4]],
        )
        .unwrap();

        assert_eq!(db.selectors_for_page("a.html").unwrap().len(), 1);
        assert_eq!(db.selectors_for_page("b.html").unwrap().len(), 1);

        assert!(db.delete_page("a.html").unwrap());
        assert!(db.selectors_for_page("a.html").unwrap().is_empty());
        assert_eq!(db.selectors_for_page("b.html").unwrap().len(), 1);
        assert!(!db.delete_page("a.html").unwrap());
    }
}
