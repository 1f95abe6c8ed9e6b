use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct RerankHit {
    /// Position in the candidate list passed to [`Reranker::rerank`].
    pub index: usize,
    pub relevance: f32,
}

#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, documents: &[String], top_n: usize)
    -> Result<Vec<RerankHit>>;
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

/// Cohere-style `/rerank` endpoint.
pub struct CohereReranker {
    api_key: String,
    base_url: String,
    model: String,
    client: Client,
}

impl CohereReranker {
    pub fn new(base_url: impl Into<String>, api_key: String, model: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
            model: model.into(),
            client: Client::new(),
        }
    }

    /// Per-request deadline enforced by the HTTP client.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        self
    }
}

#[async_trait]
impl Reranker for CohereReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>> {
        let req = RerankRequest {
            model: &self.model,
            query,
            documents,
            top_n: top_n.min(documents.len()),
        };
        let res = self
            .client
            .post(format!("{}/rerank", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&req)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(anyhow!(
                "Rerank API Error ({}): {}",
                res.status(),
                res.text().await.unwrap_or_default()
            ));
        }
        let parsed: RerankResponse = res.json().await?;
        Ok(parsed
            .results
            .into_iter()
            .map(|r| RerankHit {
                index: r.index,
                relevance: r.relevance_score,
            })
            .collect())
    }
}
