//! Per-section retrieval-augmented analysis.
//!
//! `analyze` always returns a [`SectionResult`]. When generation cannot
//! produce a valid record after its retry, the result is degraded: sentinel
//! score, reason in the narrative, retrieved sources kept.

mod prompts;

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::core::config::RetrievalSettings;
use crate::core::document::{Document, truncate_chars};
use crate::core::llm::{LlmClient, StructuredOutput};
use crate::core::orchestrator::TaskLog;
use crate::core::orchestrator::types::{SCORE_MAX, SCORE_MIN, SectionResult, SectionSpec};
use crate::core::retrieval::{
    CorpusCategory, RetrievalQuery, RetrievalService, RetrievalStrategy, RetrievedDocument,
};

/// Documents whose first characters match are treated as the same excerpt.
const DEDUPE_PREFIX_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
struct SectionQueries {
    queries: Vec<String>,
}

impl StructuredOutput for SectionQueries {
    const SCHEMA_HINT: &'static str = r#"{"queries": ["<search query>", ...]}"#;
}

#[derive(Debug, Deserialize)]
struct SectionDraft {
    analysis: String,
    recommendations: Vec<String>,
    potential_pitfalls: Vec<String>,
    supported_points: Vec<String>,
    score: i64,
}

impl StructuredOutput for SectionDraft {
    const SCHEMA_HINT: &'static str = r#"{"analysis": "<narrative>", "recommendations": ["..."], "potential_pitfalls": ["..."], "supported_points": ["..."], "score": <integer 0-5>}"#;

    fn validate(&self) -> Result<(), String> {
        if self.analysis.trim().is_empty() {
            return Err("analysis is empty".to_string());
        }
        if self.score < i64::from(SCORE_MIN) || self.score > i64::from(SCORE_MAX) {
            return Err(format!(
                "score {} outside {}..={}",
                self.score, SCORE_MIN, SCORE_MAX
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub categories: BTreeSet<CorpusCategory>,
    pub top_k: usize,
    pub strategy: RetrievalStrategy,
    pub queries_per_section: usize,
    pub fallback_query: String,
    pub fallback_limit: usize,
}

impl From<&RetrievalSettings> for AnalyzerSettings {
    fn from(s: &RetrievalSettings) -> Self {
        Self {
            categories: s.categories.iter().copied().collect(),
            top_k: s.top_k,
            strategy: s.strategy,
            queries_per_section: s.queries_per_section.max(1),
            fallback_query: s.fallback_query.clone(),
            fallback_limit: s.fallback_limit,
        }
    }
}

pub struct SectionAnalyzer {
    llm: LlmClient,
    retrieval: Arc<RetrievalService>,
    settings: AnalyzerSettings,
}

impl SectionAnalyzer {
    pub fn new(llm: LlmClient, retrieval: Arc<RetrievalService>, settings: AnalyzerSettings) -> Self {
        Self {
            llm,
            retrieval,
            settings,
        }
    }

    pub fn strategy(&self) -> RetrievalStrategy {
        self.settings.strategy
    }

    /// Same collaborators, different retrieval strategy.
    pub fn with_strategy(&self, strategy: RetrievalStrategy) -> Self {
        let mut settings = self.settings.clone();
        settings.strategy = strategy;
        Self {
            llm: self.llm.clone(),
            retrieval: Arc::clone(&self.retrieval),
            settings,
        }
    }

    pub async fn analyze(
        &self,
        spec: &SectionSpec,
        document: &Document,
        log: &mut TaskLog,
    ) -> SectionResult {
        let queries = self.formulate_queries(spec, document, log).await;
        let docs = self.gather(&queries, log).await;

        let mut sources: Vec<String> = Vec::new();
        for d in &docs {
            let citation = d.citation();
            if !sources.contains(&citation) {
                sources.push(citation);
            }
        }
        let context = grounding_context(&docs);

        let messages = prompts::section_messages(spec, document, &context);
        match self.llm.complete_with_retry::<SectionDraft>(&messages).await {
            Ok(draft) => SectionResult {
                name: spec.name.clone(),
                analysis: draft.analysis.trim().to_string(),
                recommendations: clean(draft.recommendations),
                pitfalls: clean(draft.potential_pitfalls),
                supported_points: clean(draft.supported_points),
                score: draft.score.clamp(i64::from(SCORE_MIN), i64::from(SCORE_MAX)) as u8,
                sources,
                degraded: false,
            },
            Err(e) => {
                warn!("Section {} degraded: {}", spec.name, e);
                log.push(format!("Analysis for {} degraded: {}", spec.name, e));
                SectionResult::degraded(&spec.name, &e.to_string(), sources)
            }
        }
    }

    async fn formulate_queries(
        &self,
        spec: &SectionSpec,
        document: &Document,
        log: &mut TaskLog,
    ) -> Vec<String> {
        let wanted = self.settings.queries_per_section;
        let messages = prompts::query_messages(spec, document, wanted);
        let generated = match self.llm.complete_with_retry::<SectionQueries>(&messages).await {
            Ok(q) => q
                .queries
                .into_iter()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .take(wanted)
                .collect::<Vec<_>>(),
            Err(e) => {
                log.push(format!(
                    "Query generation failed for {} ({}); using section goal",
                    spec.name, e
                ));
                Vec::new()
            }
        };
        let queries = if generated.is_empty() {
            fallback_queries(spec, document, wanted)
        } else {
            generated
        };
        log.push(format!(
            "Retrieval queries for {}: {}",
            spec.name,
            queries.join(" | ")
        ));
        queries
    }

    async fn gather(&self, queries: &[String], log: &mut TaskLog) -> Vec<RetrievedDocument> {
        let mut all = Vec::new();
        for text in queries {
            let query = RetrievalQuery {
                text: text.clone(),
                categories: self.settings.categories.clone(),
                limit: self.settings.top_k,
                strategy: self.settings.strategy,
            };
            let mut docs = self.retrieval.retrieve(&query, log).await;
            if docs.is_empty() && self.settings.fallback_limit > 0 {
                log.push(format!(
                    "No documents for '{}'; trying fallback query '{}'",
                    text, self.settings.fallback_query
                ));
                let fallback = RetrievalQuery {
                    text: self.settings.fallback_query.clone(),
                    limit: self.settings.fallback_limit,
                    ..query
                };
                docs = self.retrieval.retrieve(&fallback, log).await;
            }
            all.extend(docs);
        }
        let mut unique = dedupe_by_prefix(all);
        unique.truncate(self.settings.top_k);
        unique
    }
}

fn fallback_queries(spec: &SectionSpec, document: &Document, wanted: usize) -> Vec<String> {
    let mut out = vec![
        format!("{} {}", document.title, spec.name),
        spec.goal.clone(),
    ];
    out.truncate(wanted.max(1));
    out
}

fn clean(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn dedupe_by_prefix(docs: Vec<RetrievedDocument>) -> Vec<RetrievedDocument> {
    let mut seen = HashSet::new();
    docs.into_iter()
        .filter(|d| seen.insert(truncate_chars(&d.content, DEDUPE_PREFIX_CHARS).to_string()))
        .collect()
}

/// Each excerpt is tagged with its source so the model can cite it.
fn grounding_context(docs: &[RetrievedDocument]) -> String {
    docs.iter()
        .map(|d| format!("**Source: {}** ({})\n{}", d.title, d.category, d.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
