use std::sync::Arc;

use anyhow::anyhow;
use serde_json::json;

use super::*;
use crate::core::testing::{FakeSearch, ScriptedLlm, prompt_text, web_result};

fn document() -> Document {
    Document::new(
        "doc-1",
        "One-tap checkout",
        "A saved-wallet checkout for returning shoppers that removes form entry.",
    )
}

fn finished_section() -> SectionResult {
    SectionResult {
        name: "Audience".to_string(),
        analysis: "Returning shoppers on mobile.".to_string(),
        recommendations: vec![],
        pitfalls: vec![],
        supported_points: vec![],
        score: 4,
        sources: vec![],
        degraded: false,
    }
}

/// Query generation and synthesis answered by prompt shape.
fn llm(queries: serde_json::Value, synthesis: serde_json::Value) -> LlmClient {
    let provider = ScriptedLlm::new(move |messages| {
        let text = prompt_text(messages);
        if text.contains("web search queries") {
            Ok(queries.to_string())
        } else {
            Ok(synthesis.to_string())
        }
    });
    LlmClient::new(Arc::new(provider), "test-model").with_schema_retries(0)
}

fn augmenter(llm: LlmClient, search: FakeSearch) -> WebSearchAugmenter {
    WebSearchAugmenter::new(llm, Arc::new(search), &WebSearchSettings::default())
        .with_timeout(Duration::from_millis(500))
}

#[test]
fn canonical_url_ignores_case_fragment_and_trailing_slash() {
    assert_eq!(
        canonical_url("https://Example.com/Wallets/#pricing"),
        "https://example.com/wallets"
    );
    assert_eq!(
        canonical_url("https://example.com/wallets"),
        canonical_url("HTTPS://EXAMPLE.COM/wallets/")
    );
}

#[test]
fn dedupe_keeps_first_occurrence_per_canonical_url() {
    let results = vec![
        web_result("First", "https://example.com/a/", "one"),
        web_result("Second", "https://example.com/a#intro", "two"),
        web_result("Third", "https://example.com/b", "three"),
        web_result("No url", "  ", "four"),
    ];
    let unique = dedupe_results(results);
    let titles: Vec<_> = unique.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["First", "Third"]);
}

#[test]
fn context_limits_raw_content_and_total_budget() {
    let mut long = web_result("Long", "https://example.com/long", "summary");
    long.raw_content = Some("x".repeat(500));
    let context = build_context(&[long.clone()], 100, 10_000);
    assert!(context.contains("Full source content limited to 100 characters"));
    assert!(!context.contains(&"x".repeat(101)));

    let tight = build_context(&[long], 100, 40);
    assert_eq!(tight.chars().count(), 40);
}

#[tokio::test]
async fn augment_keeps_only_items_citing_retrieved_sources() {
    let search = FakeSearch::new(|query| {
        Ok(match query {
            "wallet checkout conversion" => vec![
                web_result("Wallet study", "https://example.com/wallets", "wallets convert"),
                web_result("Shared", "https://example.com/shared/", "shared"),
            ],
            _ => vec![web_result("Shared again", "https://example.com/shared", "dup")],
        })
    });
    let queries = search.queries();
    let llm = llm(
        json!({"queries": ["wallet checkout conversion", "one tap checkout competitors"]}),
        json!({
            "hypotheses": [
                {"text": "Wallet users convert better", "source": "https://example.com/wallets/"},
                {"text": "Made up claim", "source": "https://elsewhere.example.org/"}
            ],
            "considerations": [
                {"text": "Competitors already ship this", "source": "https://example.com/shared"}
            ]
        }),
    );
    let mut log = TaskLog::detached();
    let web = augmenter(llm, search)
        .augment(&document(), &[finished_section()], &mut log)
        .await
        .expect("suggestions");

    assert_eq!(queries.lock().unwrap().len(), 2);
    assert_eq!(web.hypotheses.len(), 1);
    assert_eq!(web.hypotheses[0].source, "https://example.com/wallets");
    assert_eq!(web.considerations.len(), 1);
    let urls: Vec<_> = web.sources.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(
        urls,
        vec!["https://example.com/wallets", "https://example.com/shared/"]
    );
    assert!(
        log.entries()
            .iter()
            .any(|l| l == "Web search returned 2 unique results from 2 queries")
    );
}

#[tokio::test]
async fn search_failure_yields_no_suggestions() {
    let search = FakeSearch::new(|_| Err(anyhow!("quota exceeded")));
    let llm = llm(
        json!({"queries": ["wallet checkout"]}),
        json!({"hypotheses": [], "considerations": []}),
    );
    let mut log = TaskLog::detached();
    let web = augmenter(llm, search)
        .augment(&document(), &[], &mut log)
        .await;
    assert!(web.is_none());
    assert!(
        log.entries()
            .iter()
            .any(|l| l.contains("Web search failed for 'wallet checkout'"))
    );
}

#[tokio::test]
async fn query_generation_failure_skips_search() {
    let search = FakeSearch::new(|_| Ok(vec![web_result("A", "https://a.example", "a")]));
    let queries = search.queries();
    let provider = ScriptedLlm::new(|_| Err(anyhow!("model overloaded")));
    let llm = LlmClient::new(Arc::new(provider), "m").with_schema_retries(0);
    let mut log = TaskLog::detached();
    let web = augmenter(llm, search)
        .augment(&document(), &[], &mut log)
        .await;
    assert!(web.is_none());
    assert!(queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn uncited_synthesis_is_dropped() {
    let search = FakeSearch::new(|_| Ok(vec![web_result("A", "https://a.example/post", "a")]));
    let llm = llm(
        json!({"queries": ["anything"]}),
        json!({
            "hypotheses": [{"text": "Unsupported", "source": "https://b.example"}],
            "considerations": []
        }),
    );
    let mut log = TaskLog::detached();
    let web = augmenter(llm, search)
        .augment(&document(), &[], &mut log)
        .await;
    assert!(web.is_none());
    assert!(
        log.entries()
            .iter()
            .any(|l| l.contains("no item cited a retrieved source"))
    );
}
