use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::{CorpusCategory, RetrievedDocument};
use crate::core::llm::Embedder;
use crate::core::store::Store;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>>;

    /// Only documents whose category is in `categories`.
    async fn search_with_filter(
        &self,
        query: &str,
        k: usize,
        categories: &BTreeSet<CorpusCategory>,
    ) -> Result<Vec<RetrievedDocument>>;
}

/// Embeds the query, then runs a KNN over the sqlite-vec corpus table.
pub struct SqliteVectorIndex {
    store: Store,
    embedder: Arc<dyn Embedder>,
}

impl SqliteVectorIndex {
    pub fn new(store: Store, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        let embedding = self.embedder.embed(query).await?;
        self.store.nearest_chunks(&embedding, k, None).await
    }

    async fn search_with_filter(
        &self,
        query: &str,
        k: usize,
        categories: &BTreeSet<CorpusCategory>,
    ) -> Result<Vec<RetrievedDocument>> {
        let embedding = self.embedder.embed(query).await?;
        self.store
            .nearest_chunks(&embedding, k, Some(categories))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::NewChunk;
    use crate::core::testing::KeywordEmbedder;

    #[tokio::test]
    async fn filtered_search_goes_through_embedder_and_store() {
        let store = Store::open_in_memory(3).expect("store");
        let embedder = Arc::new(KeywordEmbedder::new(&["churn", "pricing", "onboarding"]));
        for (title, category, text) in [
            ("Churn study", CorpusCategory::Research, "churn churn"),
            ("Pricing dash", CorpusCategory::Analytics, "pricing"),
            ("Old onboarding PRD", CorpusCategory::Prd, "onboarding churn"),
        ] {
            let chunk = NewChunk {
                source_id: title.to_string(),
                title: title.to_string(),
                category,
                content: text.to_string(),
            };
            let e = embedder.embed(text).await.expect("embed");
            store.insert_chunk(&chunk, &e).await.expect("insert");
        }

        let index = SqliteVectorIndex::new(store, embedder);
        let filter: BTreeSet<_> = [CorpusCategory::Research].into_iter().collect();
        let hits = index
            .search_with_filter("churn", 5, &filter)
            .await
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Churn study");

        let all = index.search("churn", 5).await.expect("search");
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].title, "Churn study");
    }
}
