use anyhow::Result;
use rusqlite::{OptionalExtension, params};

use super::Store;
use crate::core::document::Document;

impl Store {
    pub async fn insert_document(&self, title: &str, content: &str) -> Result<Document> {
        let id = format!("doc-{}", uuid::Uuid::new_v4().simple());
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO documents (id, title, content) VALUES (?1, ?2, ?3)",
            params![id, title, content],
        )?;
        Ok(Document::new(id, title, content))
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let db = self.db.lock().await;
        let doc = db
            .query_row(
                "SELECT id, title, content FROM documents WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Document {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        content: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(doc)
    }

    /// `(id, title)` pairs, newest first.
    pub async fn list_documents(&self) -> Result<Vec<(String, String)>> {
        let db = self.db.lock().await;
        let mut stmt =
            db.prepare("SELECT id, title FROM documents ORDER BY created_at DESC, rowid DESC")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
