use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::anyhow;
use serde_json::json;

use super::{StaticPlanner, document, engine, kinds, scripted, section_of, specs};
use crate::core::config::{PlanSettings, WebSearchSettings};
use crate::core::document::Document;
use crate::core::llm::LlmClient;
use crate::core::orchestrator::{JobEvent, JobHandle, JobState};
use crate::core::plan::CatalogPlanner;
use crate::core::testing::{FakeSearch, ScriptedLlm, prompt_text, web_result};
use crate::core::websearch::WebSearchAugmenter;

fn statuses(events: &[JobEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Status { message, .. } => Some(message.as_str()),
            _ => None,
        })
        .collect()
}

fn logs(events: &[JobEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Log { message, .. } => Some(message.as_str()),
            _ => None,
        })
        .collect()
}

fn count(events: &[JobEvent], kind: &str) -> usize {
    kinds(events).into_iter().filter(|k| *k == kind).count()
}

async fn wait_for_status(handle: &mut JobHandle, prefix: &str) {
    loop {
        let next = tokio::time::timeout(Duration::from_secs(2), handle.next_event())
            .await
            .expect("event should arrive");
        match next {
            Some(JobEvent::Status { message, .. }) if message.starts_with(prefix) => return,
            Some(_) => continue,
            None => panic!("stream ended before status '{}'", prefix),
        }
    }
}

fn web_augmenter(search: FakeSearch) -> Arc<WebSearchAugmenter> {
    let llm = ScriptedLlm::new(|messages| {
        if prompt_text(messages).contains("web search queries") {
            return Ok(json!({"queries": ["saved wallet checkout"]}).to_string());
        }
        Ok(json!({
            "hypotheses": [{"text": "Wallet users convert better", "source": "https://example.com/wallets"}],
            "considerations": []
        })
        .to_string())
    });
    let client = LlmClient::new(Arc::new(llm), "test-model").with_schema_retries(0);
    Arc::new(
        WebSearchAugmenter::new(client, Arc::new(search), &WebSearchSettings::default())
            .with_timeout(Duration::from_millis(500)),
    )
}

#[tokio::test]
async fn five_section_document_streams_sections_then_report() {
    let scores: HashMap<String, u8> = [
        ("Audience", 4),
        ("Problem", 4),
        ("Solution", 5),
        ("Go-To-Market", 5),
        ("Success Metrics", 3),
    ]
    .into_iter()
    .map(|(n, s)| (n.to_string(), s))
    .collect();
    let engine = engine(
        scripted(scores),
        Arc::new(CatalogPlanner::new(&PlanSettings::default())),
        None,
        Duration::from_secs(2),
    );

    let (job, events) = engine.start(document()).finish().await.expect("job task");

    assert_eq!(job.state(), JobState::Completed);
    assert_eq!(count(&events, "section"), 5);
    assert_eq!(count(&events, "error"), 0);
    assert_eq!(kinds(&events).last(), Some(&"final_report"));
    assert_eq!(
        statuses(&events),
        vec![
            "Starting analysis of One-tap checkout",
            "Planning analysis sections",
            "Analyzing 5 sections",
            "Section analysis complete",
            "Compiling final report",
        ]
    );

    let barrier = events
        .iter()
        .position(|e| matches!(e, JobEvent::Status { message, .. } if message == "Section analysis complete"))
        .expect("barrier status");
    let last_section = events
        .iter()
        .rposition(|e| matches!(e, JobEvent::Section { .. }))
        .expect("section events");
    assert!(last_section < barrier);

    let logs = logs(&events);
    assert!(logs.contains(&"Generated analysis plan with 5 sections"));
    assert!(logs.iter().any(|l| l.ends_with("(5/5)")));

    let Some(JobEvent::FinalReport {
        content,
        aggregate_score,
        ..
    }) = events.last()
    else {
        panic!("final report should be last");
    };
    assert_eq!(*aggregate_score, 4);
    assert!(content.contains("**Overall Score: 4/5**"));
    let audience = content.find("## Audience").expect("audience");
    let metrics = content.find("## Success Metrics").expect("metrics");
    assert!(audience < metrics);
    assert!(!content.contains("Feature & Design Ideas"));
}

#[tokio::test]
async fn empty_document_emits_a_single_error() {
    let engine = engine(
        scripted(HashMap::new()),
        Arc::new(CatalogPlanner::new(&PlanSettings::default())),
        None,
        Duration::from_secs(2),
    );

    let (job, events) = engine
        .start(Document::new("doc-empty", "Empty", ""))
        .finish()
        .await
        .expect("job task");

    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(count(&events, "error"), 1);
    assert_eq!(count(&events, "section"), 0);
    assert_eq!(count(&events, "final_report"), 0);
    match events.last() {
        Some(JobEvent::Error { message, .. }) => assert!(message.contains("document is empty")),
        other => panic!("expected error last, got {:?}", other),
    }
    assert!(job.report().is_none());
}

#[tokio::test]
async fn timed_out_section_degrades_without_failing_the_job() {
    let llm = scripted(HashMap::new()).with_delay_fn(|messages| {
        if section_of(messages).as_deref() == Some("Problem") {
            Duration::from_millis(500)
        } else {
            Duration::ZERO
        }
    });
    let engine = engine(
        llm,
        Arc::new(StaticPlanner(specs(&["Audience", "Problem", "Solution"]))),
        None,
        Duration::from_millis(100),
    );

    let (job, events) = engine.start(document()).finish().await.expect("job task");

    assert_eq!(job.state(), JobState::Completed);
    assert_eq!(count(&events, "section"), 3);
    let problem = &job.results()["Problem"];
    assert!(problem.degraded);
    assert_eq!(problem.score, 0);
    assert!(problem.analysis.contains("timed out"));
    assert!(!job.results()["Audience"].degraded);

    let report = job.report().expect("report");
    assert_eq!(report.aggregate_score, 2);
    assert!(report.content.contains("## Problem (Score: 0/5) [degraded]"));
}

#[tokio::test]
async fn web_suggestions_are_appended_to_the_report() {
    let search = FakeSearch::new(|_| {
        Ok(vec![web_result(
            "Wallet study",
            "https://example.com/wallets",
            "Saved wallets lift conversion",
        )])
    });
    let engine = engine(
        scripted(HashMap::new()),
        Arc::new(StaticPlanner(specs(&["Audience", "Problem"]))),
        Some(web_augmenter(search)),
        Duration::from_secs(2),
    );

    let (job, events) = engine.start(document()).finish().await.expect("job task");

    assert_eq!(job.state(), JobState::Completed);
    assert!(statuses(&events).contains(&"Searching the web for market context"));
    let report = job.report().expect("report");
    let web = report.web.as_ref().expect("web suggestions");
    assert_eq!(web.hypotheses.len(), 1);
    assert!(report.content.contains("## Feature & Design Ideas"));
    assert!(report.content.contains("Wallet study (https://example.com/wallets)"));
}

#[tokio::test]
async fn web_search_failure_still_completes_the_report() {
    let search = FakeSearch::new(|_| Err(anyhow!("search provider down")));
    let engine = engine(
        scripted(HashMap::new()),
        Arc::new(StaticPlanner(specs(&["Audience"]))),
        Some(web_augmenter(search)),
        Duration::from_secs(2),
    );

    let (job, events) = engine.start(document()).finish().await.expect("job task");

    assert_eq!(job.state(), JobState::Completed);
    assert_eq!(kinds(&events).last(), Some(&"final_report"));
    let report = job.report().expect("report");
    assert!(report.web.is_none());
    assert!(!report.content.contains("Feature & Design Ideas"));
}

#[tokio::test]
async fn disconnect_cancels_outstanding_sections() {
    let llm = scripted(HashMap::new()).with_delay_fn(|messages| {
        if section_of(messages).is_some() {
            Duration::from_secs(5)
        } else {
            Duration::ZERO
        }
    });
    let calls = llm.calls();
    let engine = engine(
        llm,
        Arc::new(StaticPlanner(specs(&["Audience", "Problem", "Solution"]))),
        None,
        Duration::from_secs(10),
    );

    let mut handle = engine.start(document());
    wait_for_status(&mut handle, "Analyzing").await;
    let task = handle.disconnect();

    let job = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("job should stop within the grace period")
        .expect("job task");
    assert_eq!(job.state(), JobState::Canceled);
    assert!(job.report().is_none());

    let settled = calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), settled);
}

#[tokio::test]
async fn explicit_cancel_stops_the_stream_without_terminal_event() {
    let llm = scripted(HashMap::new()).with_delay_fn(|messages| {
        if section_of(messages).is_some() {
            Duration::from_secs(5)
        } else {
            Duration::ZERO
        }
    });
    let engine = engine(
        llm,
        Arc::new(StaticPlanner(specs(&["Audience", "Problem"]))),
        None,
        Duration::from_secs(10),
    );

    let mut handle = engine.start(document());
    wait_for_status(&mut handle, "Analyzing").await;
    handle.cancel();

    let (job, rest) = tokio::time::timeout(Duration::from_secs(1), handle.finish())
        .await
        .expect("job should stop promptly")
        .expect("job task");
    assert_eq!(job.state(), JobState::Canceled);
    assert_eq!(job.error(), Some("canceled"));
    assert!(rest.iter().all(|e| !e.is_terminal()));
}
