//! Side-by-side runs of both retrieval strategies over a query set.

use std::collections::{BTreeSet, HashSet};

use super::{CorpusCategory, RetrievalQuery, RetrievalService, RetrievalStrategy, RetrievedDocument};
use crate::core::orchestrator::TaskLog;

#[derive(Debug, Clone)]
pub struct QueryComparison {
    pub query: String,
    pub plain: Vec<RetrievedDocument>,
    pub compressed: Vec<RetrievedDocument>,
}

impl QueryComparison {
    pub fn results(&self, strategy: RetrievalStrategy) -> &[RetrievedDocument] {
        match strategy {
            RetrievalStrategy::Plain => &self.plain,
            RetrievalStrategy::Compressed => &self.compressed,
        }
    }

    /// Source ids returned by both strategies.
    pub fn shared(&self) -> usize {
        let plain: HashSet<&str> = self.plain.iter().map(|d| d.source_id.as_str()).collect();
        self.compressed
            .iter()
            .map(|d| d.source_id.as_str())
            .collect::<HashSet<_>>()
            .intersection(&plain)
            .count()
    }

    /// Jaccard overlap of the two result sets; two empty sets agree fully.
    pub fn overlap(&self) -> f32 {
        let plain: HashSet<&str> = self.plain.iter().map(|d| d.source_id.as_str()).collect();
        let compressed: HashSet<&str> =
            self.compressed.iter().map(|d| d.source_id.as_str()).collect();
        let union = plain.union(&compressed).count();
        if union == 0 {
            return 1.0;
        }
        plain.intersection(&compressed).count() as f32 / union as f32
    }
}

#[derive(Debug, Clone, Default)]
pub struct StrategyComparison {
    pub queries: Vec<QueryComparison>,
    /// Fallback and degradation lines logged while retrieving.
    pub notes: Vec<String>,
}

impl StrategyComparison {
    pub fn total_hits(&self, strategy: RetrievalStrategy) -> usize {
        self.queries.iter().map(|q| q.results(strategy).len()).sum()
    }

    /// Queries for which the strategy found nothing.
    pub fn misses(&self, strategy: RetrievalStrategy) -> usize {
        self.queries
            .iter()
            .filter(|q| q.results(strategy).is_empty())
            .count()
    }

    /// Mean of each query's best score, over queries with at least one hit.
    pub fn mean_top_score(&self, strategy: RetrievalStrategy) -> Option<f32> {
        let tops: Vec<f32> = self
            .queries
            .iter()
            .filter_map(|q| q.results(strategy).first().map(|d| d.score))
            .collect();
        if tops.is_empty() {
            return None;
        }
        Some(tops.iter().sum::<f32>() / tops.len() as f32)
    }

    pub fn mean_overlap(&self) -> Option<f32> {
        if self.queries.is_empty() {
            return None;
        }
        let sum: f32 = self.queries.iter().map(QueryComparison::overlap).sum();
        Some(sum / self.queries.len() as f32)
    }
}

/// Runs every query through both strategies with the same filter and limit.
/// Queries run one at a time so rerank quotas see a steady rate.
pub async fn compare_strategies(
    service: &RetrievalService,
    queries: &[String],
    categories: &BTreeSet<CorpusCategory>,
    limit: usize,
) -> StrategyComparison {
    let mut log = TaskLog::detached();
    let mut comparison = StrategyComparison::default();

    for text in queries {
        let run = |strategy| RetrievalQuery {
            text: text.clone(),
            categories: categories.clone(),
            limit,
            strategy,
        };
        let plain = service.retrieve(&run(RetrievalStrategy::Plain), &mut log).await;
        let compressed = service
            .retrieve(&run(RetrievalStrategy::Compressed), &mut log)
            .await;
        comparison.queries.push(QueryComparison {
            query: text.clone(),
            plain,
            compressed,
        });
    }

    comparison.notes = log
        .into_entries()
        .into_iter()
        .filter(|line| !line.starts_with("Retrieved "))
        .collect();
    comparison
}
