//! Corpus retrieval for section grounding.
//!
//! A call never fails: a broken filtered search is retried once without the
//! category constraint, a broken reranker falls back to similarity order,
//! and anything else yields an empty result. Every call leaves one summary
//! line in the task log.

mod evaluate;
mod index;
mod rerank;

pub use evaluate::{StrategyComparison, compare_strategies};

pub use index::{SqliteVectorIndex, VectorIndex};
pub use rerank::{CohereReranker, RerankHit, Reranker};

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::config::Settings;
use crate::core::llm::Embedder;
use crate::core::llm::providers::OpenAiEmbedder;
use crate::core::orchestrator::TaskLog;
use crate::core::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorpusCategory {
    Prd,
    Research,
    Analytics,
}

impl CorpusCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            CorpusCategory::Prd => "prd",
            CorpusCategory::Research => "research",
            CorpusCategory::Analytics => "analytics",
        }
    }
}

impl fmt::Display for CorpusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorpusCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prd" => Ok(CorpusCategory::Prd),
            "research" => Ok(CorpusCategory::Research),
            "analytics" => Ok(CorpusCategory::Analytics),
            other => Err(anyhow!("unknown corpus category '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    #[default]
    Plain,
    Compressed,
}

impl RetrievalStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            RetrievalStrategy::Plain => "plain",
            RetrievalStrategy::Compressed => "compressed",
        }
    }
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "naive" => Ok(RetrievalStrategy::Plain),
            "compressed" | "contextual_compression" => Ok(RetrievalStrategy::Compressed),
            other => Err(anyhow!("unknown retrieval strategy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    pub text: String,
    pub categories: BTreeSet<CorpusCategory>,
    pub limit: usize,
    pub strategy: RetrievalStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDocument {
    pub source_id: String,
    pub title: String,
    pub content: String,
    pub score: f32,
    pub category: CorpusCategory,
}

impl RetrievedDocument {
    /// Identifier used when a section cites this document.
    pub fn citation(&self) -> String {
        format!("{} ({})", self.title, self.category)
    }
}

fn describe_filter(categories: &BTreeSet<CorpusCategory>) -> String {
    if categories.is_empty() {
        return "none".to_string();
    }
    let names: Vec<&str> = categories.iter().map(|c| c.as_str()).collect();
    format!("category in [{}]", names.join(", "))
}

fn sort_by_score(docs: &mut [RetrievedDocument]) {
    docs.sort_by(|a, b| b.score.total_cmp(&a.score));
}

pub struct RetrievalService {
    index: Arc<dyn VectorIndex>,
    reranker: Option<Arc<dyn Reranker>>,
    timeout: Duration,
    overfetch: usize,
}

impl RetrievalService {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        reranker: Option<Arc<dyn Reranker>>,
        timeout: Duration,
        overfetch: usize,
    ) -> Self {
        Self {
            index,
            reranker,
            timeout,
            overfetch: overfetch.clamp(2, 3),
        }
    }

    /// Corpus search over `store`, reranked through Cohere when a key is set.
    pub fn from_settings(settings: &Settings, store: Store) -> Self {
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::from_settings(settings));
        let index = Arc::new(SqliteVectorIndex::new(store, embedder));
        let reranker: Option<Arc<dyn Reranker>> = match &settings.rerank.api_key {
            Some(key) if settings.rerank_enabled() => Some(Arc::new(
                CohereReranker::new(
                    settings.rerank.base_url.clone(),
                    key.clone(),
                    settings.rerank.model.clone(),
                )
                .with_timeout(settings.rerank.timeout()),
            )),
            _ => {
                info!("Rerank disabled (no key); compressed retrieval will use similarity order");
                None
            }
        };
        Self::new(
            index,
            reranker,
            settings.retrieval.timeout(),
            settings.retrieval.overfetch_multiplier(),
        )
    }

    pub async fn retrieve(&self, query: &RetrievalQuery, log: &mut TaskLog) -> Vec<RetrievedDocument> {
        let limit = query.limit.max(1);
        let fetch_k = match query.strategy {
            RetrievalStrategy::Plain => limit,
            RetrievalStrategy::Compressed => limit * self.overfetch,
        };
        let filter = describe_filter(&query.categories);

        let primary = self
            .bounded(self.index.search_with_filter(&query.text, fetch_k, &query.categories))
            .await;
        let mut candidates = match primary {
            Ok(docs) => docs,
            Err(e) => {
                warn!("Filtered retrieval failed for '{}': {}", query.text, e);
                log.push(format!(
                    "Filtered retrieval failed ({}); retrying '{}' without category filter",
                    e, query.text
                ));
                match self.bounded(self.index.search(&query.text, fetch_k)).await {
                    Ok(docs) => docs,
                    Err(e) => {
                        warn!("Unfiltered retrieval failed for '{}': {}", query.text, e);
                        log.push(format!(
                            "Retrieval unavailable ({}); continuing without grounding for '{}'",
                            e, query.text
                        ));
                        Vec::new()
                    }
                }
            }
        };
        sort_by_score(&mut candidates);

        let docs = match query.strategy {
            RetrievalStrategy::Plain => {
                candidates.truncate(limit);
                candidates
            }
            RetrievalStrategy::Compressed => self.compress(&query.text, candidates, limit, log).await,
        };

        log.push(format!(
            "Retrieved {} documents for '{}' (filter: {}, strategy: {})",
            docs.len(),
            query.text,
            filter,
            query.strategy
        ));
        docs
    }

    async fn compress(
        &self,
        query: &str,
        mut candidates: Vec<RetrievedDocument>,
        limit: usize,
        log: &mut TaskLog,
    ) -> Vec<RetrievedDocument> {
        if candidates.is_empty() {
            return candidates;
        }
        let Some(reranker) = &self.reranker else {
            log.push("Reranker not configured; using similarity order");
            candidates.truncate(limit);
            return candidates;
        };

        let texts: Vec<String> = candidates.iter().map(|d| d.content.clone()).collect();
        match self.bounded(reranker.rerank(query, &texts, limit)).await {
            Ok(hits) => {
                let mut seen = HashSet::new();
                let mut reranked = Vec::with_capacity(limit);
                for hit in hits {
                    if let Some(doc) = candidates.get(hit.index)
                        && seen.insert(hit.index)
                    {
                        let mut doc = doc.clone();
                        doc.score = hit.relevance;
                        reranked.push(doc);
                    }
                }
                if reranked.is_empty() {
                    log.push("Reranker returned no usable hits; using similarity order");
                    candidates.truncate(limit);
                    return candidates;
                }
                sort_by_score(&mut reranked);
                reranked.truncate(limit);
                reranked
            }
            Err(e) => {
                warn!("Rerank failed for '{}': {}", query, e);
                log.push(format!(
                    "Rerank failed ({}); falling back to similarity results",
                    e
                ));
                candidates.truncate(limit);
                candidates
            }
        }
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("timed out after {}ms", self.timeout.as_millis())),
        }
    }
}
