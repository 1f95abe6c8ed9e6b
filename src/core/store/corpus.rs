use std::collections::BTreeSet;

use anyhow::{Result, bail};
use rusqlite::params;
use rusqlite::types::Value;

use super::Store;
use crate::core::retrieval::{CorpusCategory, RetrievedDocument};

/// Upper bound on `k` for the vec0 KNN query.
const MAX_KNN_POOL: usize = 4096;

#[derive(Debug, Clone)]
pub struct NewChunk {
    pub source_id: String,
    pub title: String,
    pub category: CorpusCategory,
    pub content: String,
}

fn vector_literal(embedding: &[f32]) -> Result<String> {
    Ok(serde_json::to_string(embedding)?)
}

impl Store {
    pub async fn insert_chunk(&self, chunk: &NewChunk, embedding: &[f32]) -> Result<i64> {
        if embedding.len() != self.dimensions {
            bail!(
                "embedding has {} dimensions, corpus index expects {}",
                embedding.len(),
                self.dimensions
            );
        }
        let vector = vector_literal(embedding)?;
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO corpus_chunks (source_id, title, category, content) VALUES (?1, ?2, ?3, ?4)",
            params![
                chunk.source_id,
                chunk.title,
                chunk.category.as_str(),
                chunk.content
            ],
        )?;
        let id = db.last_insert_rowid();
        db.execute(
            "INSERT INTO vss_corpus (rowid, embedding) VALUES (?1, ?2)",
            params![id, vector],
        )?;
        Ok(id)
    }

    /// Nearest chunks by vector distance. With `categories` set, only chunks
    /// whose category is a member of the set are returned.
    pub async fn nearest_chunks(
        &self,
        embedding: &[f32],
        k: usize,
        categories: Option<&BTreeSet<CorpusCategory>>,
    ) -> Result<Vec<RetrievedDocument>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if let Some(set) = categories
            && set.is_empty()
        {
            bail!("category filter is empty");
        }

        // Filtered searches scan in-category chunks exactly; KNN is unfiltered only.
        let mut values: Vec<Value> = vec![Value::Text(vector_literal(embedding)?)];
        let mut sql = match categories {
            Some(set) => {
                let placeholders: Vec<String> =
                    (0..set.len()).map(|i| format!("?{}", i + 2)).collect();
                values.extend(set.iter().map(|c| Value::Text(c.as_str().to_string())));
                format!(
                    "SELECT c.source_id, c.title, c.content, c.category,
                            vec_distance_l2(v.embedding, ?1) AS distance
                     FROM corpus_chunks c
                     JOIN vss_corpus v ON v.rowid = c.id
                     WHERE c.category IN ({})
                     ORDER BY distance ASC",
                    placeholders.join(", ")
                )
            }
            None => {
                values.push(Value::Integer(k.min(MAX_KNN_POOL) as i64));
                String::from(
                    "SELECT c.source_id, c.title, c.content, c.category, v.distance
                     FROM (SELECT rowid, distance FROM vss_corpus WHERE embedding MATCH ?1 AND k = ?2) v
                     JOIN corpus_chunks c ON c.id = v.rowid
                     ORDER BY v.distance ASC",
                )
            }
        };
        sql.push_str(&format!(" LIMIT ?{}", values.len() + 1));
        values.push(Value::Integer(k as i64));

        let db = self.db.lock().await;
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), |row| {
            let category: String = row.get(3)?;
            let distance: f64 = row.get(4)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                category,
                distance,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (source_id, title, content, category, distance) = row?;
            let Ok(category) = category.parse::<CorpusCategory>() else {
                continue;
            };
            out.push(RetrievedDocument {
                source_id,
                title,
                content,
                score: (1.0 / (1.0 + distance)) as f32,
                category,
            });
        }
        Ok(out)
    }
}
