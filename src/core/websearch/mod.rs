//! Best-effort market context from web search.
//!
//! Queries are generated from the document and the finished sections, run
//! concurrently, deduplicated by canonical URL and folded into a bounded
//! context for one synthesis call. Any failure along the way yields `None`.

mod tavily;

pub use tavily::TavilySearch;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{info, warn};
use url::Url;

use crate::core::config::WebSearchSettings;
use crate::core::document::{Document, truncate_chars};
use crate::core::llm::{ChatMessage, LlmClient, StructuredOutput};
use crate::core::orchestrator::TaskLog;
use crate::core::orchestrator::types::{SectionResult, Suggestion, WebSource, WebSuggestion};

const DOCUMENT_EXCERPT_CHARS: usize = 1000;
const SECTION_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub raw_content: Option<String>,
    #[serde(default)]
    pub score: f32,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>>;
}

/// Lowercased URL without fragment or trailing slash.
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut canonical = match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => trimmed.split('#').next().unwrap_or(trimmed).to_string(),
    }
    .to_lowercase();
    while canonical.ends_with('/') {
        canonical.pop();
    }
    canonical
}

/// Keeps the first result seen for each canonical URL.
pub fn dedupe_results(results: impl IntoIterator<Item = WebResult>) -> Vec<WebResult> {
    let mut seen = std::collections::HashSet::new();
    results
        .into_iter()
        .filter(|r| !r.url.trim().is_empty() && seen.insert(canonical_url(&r.url)))
        .collect()
}

pub fn build_context(results: &[WebResult], max_chars_per_source: usize, budget: usize) -> String {
    let mut out = String::from("Sources:\n\n");
    for r in results {
        out.push_str(&format!(
            "Source: {}\n===\nURL: {}\n===\nMost relevant content from source: {}\n===\n",
            r.title, r.url, r.content
        ));
        if let Some(raw) = r.raw_content.as_deref().filter(|s| !s.trim().is_empty()) {
            out.push_str(&format!(
                "Full source content limited to {} characters: {}\n\n",
                max_chars_per_source,
                truncate_chars(raw, max_chars_per_source)
            ));
        } else {
            out.push('\n');
        }
    }
    truncate_chars(&out, budget).to_string()
}

#[derive(Debug, Deserialize)]
struct WebQueries {
    queries: Vec<String>,
}

impl StructuredOutput for WebQueries {
    const SCHEMA_HINT: &'static str = r#"{"queries": ["<search query>", ...]}"#;

    fn validate(&self) -> Result<(), String> {
        if self.queries.iter().all(|q| q.trim().is_empty()) {
            return Err("no usable queries".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct DraftSuggestion {
    text: String,
    source: String,
}

#[derive(Debug, Deserialize)]
struct SynthesisDraft {
    hypotheses: Vec<DraftSuggestion>,
    considerations: Vec<DraftSuggestion>,
}

impl StructuredOutput for SynthesisDraft {
    const SCHEMA_HINT: &'static str = r#"{"hypotheses": [{"text": "<hypothesis to validate>", "source": "<URL from the sources>"}], "considerations": [{"text": "<market or design consideration>", "source": "<URL from the sources>"}]}"#;
}

pub struct WebSearchAugmenter {
    llm: LlmClient,
    provider: Arc<dyn SearchProvider>,
    num_queries: usize,
    max_results: usize,
    max_chars_per_source: usize,
    context_char_budget: usize,
    timeout: Duration,
}

impl WebSearchAugmenter {
    pub fn new(llm: LlmClient, provider: Arc<dyn SearchProvider>, settings: &WebSearchSettings) -> Self {
        Self {
            llm,
            provider,
            num_queries: settings.num_queries.max(1),
            max_results: settings.max_results.max(1),
            max_chars_per_source: settings.max_chars_per_source,
            context_char_budget: settings.context_char_budget,
            timeout: settings.timeout(),
        }
    }

    #[cfg(test)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn augment(
        &self,
        document: &Document,
        sections: &[SectionResult],
        log: &mut TaskLog,
    ) -> Option<WebSuggestion> {
        let queries = match self.generate_queries(document, sections).await {
            Ok(q) if !q.is_empty() => q,
            Ok(_) => {
                log.push("Web search skipped: no queries generated");
                return None;
            }
            Err(e) => {
                warn!("Web query generation failed: {}", e);
                log.push(format!("Web search skipped: query generation failed ({})", e));
                return None;
            }
        };
        log.push(format!("Generated {} web search queries", queries.len()));

        let results = self.run_queries(&queries, log).await;
        let unique = dedupe_results(results);
        log.push(format!(
            "Web search returned {} unique results from {} queries",
            unique.len(),
            queries.len()
        ));
        if unique.is_empty() {
            return None;
        }

        let context = build_context(&unique, self.max_chars_per_source, self.context_char_budget);
        let messages = vec![
            ChatMessage::system(
                "You are a product strategist. Using only the web sources provided, list hypotheses the \
                 team should validate and market or design considerations for this product. Cite the URL \
                 of the source that supports each item.",
            ),
            ChatMessage::user(format!(
                "Document: {}\n{}\n\n{}",
                document.title,
                document.excerpt(DOCUMENT_EXCERPT_CHARS),
                context
            )),
        ];
        let draft = match self.llm.complete_with_retry::<SynthesisDraft>(&messages).await {
            Ok(d) => d,
            Err(e) => {
                warn!("Web synthesis failed: {}", e);
                log.push(format!("Web suggestions unavailable: {}", e));
                return None;
            }
        };

        let suggestion = cite_from_results(draft, &unique);
        if suggestion.hypotheses.is_empty() && suggestion.considerations.is_empty() {
            log.push("Web suggestions dropped: no item cited a retrieved source");
            return None;
        }
        info!(
            "Web augmentation produced {} hypotheses and {} considerations",
            suggestion.hypotheses.len(),
            suggestion.considerations.len()
        );
        Some(suggestion)
    }

    async fn generate_queries(
        &self,
        document: &Document,
        sections: &[SectionResult],
    ) -> Result<Vec<String>, crate::core::error::GenerationError> {
        let section_context: Vec<String> = sections
            .iter()
            .map(|s| {
                format!(
                    "{}: {}",
                    s.name,
                    truncate_chars(&s.analysis, SECTION_EXCERPT_CHARS)
                )
            })
            .collect();
        let messages = vec![
            ChatMessage::system(format!(
                "Write {} web search queries that would surface competitor products, market trends and \
                 UX patterns relevant to this product document.",
                self.num_queries
            )),
            ChatMessage::user(format!(
                "Document: {}\n{}\n\nAnalysis so far:\n{}",
                document.title,
                document.excerpt(DOCUMENT_EXCERPT_CHARS),
                section_context.join("\n")
            )),
        ];
        let generated: WebQueries = self.llm.complete_with_retry(&messages).await?;
        Ok(generated
            .queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .take(self.num_queries)
            .collect())
    }

    /// Runs every query concurrently; output keeps query order.
    async fn run_queries(&self, queries: &[String], log: &mut TaskLog) -> Vec<WebResult> {
        let mut set = JoinSet::new();
        for (i, query) in queries.iter().enumerate() {
            let provider = Arc::clone(&self.provider);
            let query = query.clone();
            let timeout = self.timeout;
            let max_results = self.max_results;
            set.spawn(async move {
                let outcome =
                    tokio::time::timeout(timeout, provider.search(&query, max_results)).await;
                (i, query, outcome)
            });
        }

        let mut per_query: Vec<(usize, Vec<WebResult>)> = Vec::with_capacity(queries.len());
        while let Some(res) = set.join_next().await {
            match res {
                Ok((i, _, Ok(Ok(results)))) => per_query.push((i, results)),
                Ok((_, query, Ok(Err(e)))) => {
                    log.push(format!("Web search failed for '{}': {}", query, e));
                }
                Ok((_, query, Err(_))) => {
                    log.push(format!(
                        "Web search timed out for '{}' after {}ms",
                        query,
                        self.timeout.as_millis()
                    ));
                }
                Err(e) => warn!("Web search task aborted: {}", e),
            }
        }
        per_query.sort_by_key(|(i, _)| *i);
        per_query.into_iter().flat_map(|(_, r)| r).collect()
    }
}

fn cite_from_results(draft: SynthesisDraft, results: &[WebResult]) -> WebSuggestion {
    let by_url: HashMap<String, &WebResult> =
        results.iter().map(|r| (canonical_url(&r.url), r)).collect();
    let mut cited: Vec<String> = Vec::new();

    let mut keep = |items: Vec<DraftSuggestion>| -> Vec<Suggestion> {
        items
            .into_iter()
            .filter(|s| !s.text.trim().is_empty())
            .filter_map(|s| {
                let key = canonical_url(&s.source);
                let hit = by_url.get(&key)?;
                if !cited.contains(&key) {
                    cited.push(key);
                }
                Some(Suggestion {
                    text: s.text.trim().to_string(),
                    source: hit.url.clone(),
                })
            })
            .collect()
    };
    let hypotheses = keep(draft.hypotheses);
    let considerations = keep(draft.considerations);

    let sources = results
        .iter()
        .filter(|r| cited.contains(&canonical_url(&r.url)))
        .map(|r| WebSource {
            title: r.title.clone(),
            url: r.url.clone(),
        })
        .collect();

    WebSuggestion {
        hypotheses,
        considerations,
        sources,
    }
}

#[cfg(test)]
mod tests;
