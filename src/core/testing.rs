//! Test doubles shared by the module tests.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::Router;
use tokio::sync::oneshot;

use crate::core::llm::{ChatMessage, Embedder, GenerationOptions, LlmProvider};
use crate::core::retrieval::{CorpusCategory, RerankHit, Reranker, RetrievedDocument, VectorIndex};
use crate::core::websearch::{SearchProvider, WebResult};

/// Serves a router on an ephemeral loopback port until shut down.
pub struct MockHttpServer {
    pub port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl MockHttpServer {
    pub async fn start(app: Router) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });
        Ok(Self {
            port,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

/// Concatenated message contents, for matching on prompts.
pub fn prompt_text(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

type Responder = Box<dyn Fn(&[ChatMessage]) -> Result<String> + Send + Sync>;
type DelayFn = Box<dyn Fn(&[ChatMessage]) -> Duration + Send + Sync>;

/// An [`LlmProvider`] that answers from a closure.
pub struct ScriptedLlm {
    respond: Responder,
    delay: DelayFn,
    calls: Arc<AtomicUsize>,
}

impl ScriptedLlm {
    pub fn new(respond: impl Fn(&[ChatMessage]) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            delay: Box::new(|_| Duration::ZERO),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replies in order, then errors once the script runs out.
    pub fn sequence(replies: Vec<Result<String>>) -> Self {
        let queue = Mutex::new(VecDeque::from(replies));
        Self::new(move |_| {
            queue
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("script exhausted")))
        })
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.with_delay_fn(move |_| delay)
    }

    pub fn with_delay_fn(
        mut self,
        delay: impl Fn(&[ChatMessage]) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay = Box::new(delay);
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        _model_id: &str,
        messages: &[ChatMessage],
        _options: GenerationOptions,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = (self.delay)(messages);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        (self.respond)(messages)
    }
}

/// Embeds text as normalized keyword counts, one dimension per keyword.
pub struct KeywordEmbedder {
    keywords: Vec<String>,
}

impl KeywordEmbedder {
    pub fn new(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lowered = text.to_lowercase();
        let mut v: Vec<f32> = self
            .keywords
            .iter()
            .map(|k| lowered.matches(k.as_str()).count() as f32)
            .collect();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }
}

pub fn retrieved(title: &str, category: CorpusCategory, content: &str, score: f32) -> RetrievedDocument {
    RetrievedDocument {
        source_id: title.to_lowercase().replace(' ', "-"),
        title: title.to_string(),
        content: content.to_string(),
        score,
        category,
    }
}

/// In-memory [`VectorIndex`] that records each call as `filtered:<q>` or
/// `all:<q>`.
#[derive(Default)]
pub struct FakeIndex {
    docs: Vec<RetrievedDocument>,
    fail_filtered: bool,
    fail_all: bool,
    delay: Duration,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeIndex {
    pub fn new(docs: Vec<RetrievedDocument>) -> Self {
        Self {
            docs,
            ..Self::default()
        }
    }

    pub fn failing_filter(mut self) -> Self {
        self.fail_filtered = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_filtered = true;
        self.fail_all = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }

    async fn record(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl VectorIndex for FakeIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        self.record(format!("all:{}", query)).await;
        if self.fail_all {
            return Err(anyhow!("index offline"));
        }
        Ok(self.docs.iter().take(k).cloned().collect())
    }

    async fn search_with_filter(
        &self,
        query: &str,
        k: usize,
        categories: &BTreeSet<CorpusCategory>,
    ) -> Result<Vec<RetrievedDocument>> {
        self.record(format!("filtered:{}", query)).await;
        if self.fail_filtered {
            return Err(anyhow!("filter not supported"));
        }
        Ok(self
            .docs
            .iter()
            .filter(|d| categories.contains(&d.category))
            .take(k)
            .cloned()
            .collect())
    }
}

pub enum FakeReranker {
    /// Ranks candidates last-first.
    Reversed,
    Failing,
    Empty,
}

#[async_trait]
impl Reranker for FakeReranker {
    async fn rerank(
        &self,
        _query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>> {
        match self {
            FakeReranker::Reversed => Ok((0..documents.len())
                .rev()
                .enumerate()
                .map(|(rank, index)| RerankHit {
                    index,
                    relevance: 1.0 - rank as f32 * 0.1,
                })
                .take(top_n)
                .collect()),
            FakeReranker::Failing => Err(anyhow!("rerank quota exceeded")),
            FakeReranker::Empty => Ok(Vec::new()),
        }
    }
}

type SearchFn = Box<dyn Fn(&str) -> Result<Vec<WebResult>> + Send + Sync>;

/// A [`SearchProvider`] answering from a closure.
pub struct FakeSearch {
    respond: SearchFn,
    queries: Arc<Mutex<Vec<String>>>,
}

impl FakeSearch {
    pub fn new(respond: impl Fn(&str) -> Result<Vec<WebResult>> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn queries(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.queries)
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>> {
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.to_string());
        let mut results = (self.respond)(query)?;
        results.truncate(max_results);
        Ok(results)
    }
}

pub fn web_result(title: &str, url: &str, content: &str) -> WebResult {
    WebResult {
        title: title.to_string(),
        url: url.to_string(),
        content: content.to_string(),
        raw_content: None,
        score: 0.5,
    }
}
