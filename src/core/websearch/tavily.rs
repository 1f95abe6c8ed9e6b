use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{SearchProvider, WebResult};

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: usize,
    include_raw_content: bool,
    search_depth: &'static str,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<WebResult>,
}

pub struct TavilySearch {
    api_key: String,
    base_url: String,
    client: Client,
}

impl TavilySearch {
    pub fn new(base_url: impl Into<String>, api_key: String) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>> {
        let req = SearchRequest {
            query,
            max_results,
            include_raw_content: true,
            search_depth: "basic",
        };
        let res = self
            .client
            .post(format!("{}/search", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&req)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(anyhow!(
                "Search API Error ({}): {}",
                res.status(),
                res.text().await.unwrap_or_default()
            ));
        }
        let parsed: SearchResponse = res.json().await?;
        let mut results = parsed.results;
        results.truncate(max_results);
        Ok(results)
    }
}
