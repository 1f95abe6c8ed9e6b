mod scenarios;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::core::analysis::{AnalyzerSettings, SectionAnalyzer};
use crate::core::config::RetrievalSettings;
use crate::core::document::Document;
use crate::core::error::PlanningError;
use crate::core::llm::{ChatMessage, LlmClient};
use crate::core::orchestrator::{AnalysisEngine, JobEvent, SectionSpec};
use crate::core::plan::Planner;
use crate::core::retrieval::{CorpusCategory, RetrievalService};
use crate::core::testing::{FakeIndex, ScriptedLlm, prompt_text, retrieved};
use crate::core::websearch::WebSearchAugmenter;

pub(super) struct StaticPlanner(pub Vec<SectionSpec>);

#[async_trait]
impl Planner for StaticPlanner {
    async fn plan(&self, _document: &Document) -> Result<Vec<SectionSpec>, PlanningError> {
        Ok(self.0.clone())
    }
}

pub(super) fn specs(names: &[&str]) -> Vec<SectionSpec> {
    names
        .iter()
        .enumerate()
        .map(|(order, name)| SectionSpec {
            name: name.to_string(),
            goal: format!("Assess {}", name),
            order,
        })
        .collect()
}

pub(super) fn document() -> Document {
    Document::new(
        "doc-checkout",
        "One-tap checkout",
        "Returning shoppers abandon the checkout form on mobile. We will offer saved wallets so \
         they can pay in one tap, launch to 10% of traffic and measure conversion.",
    )
}

/// Name of the section a section-analysis prompt is about.
pub(super) fn section_of(messages: &[ChatMessage]) -> Option<String> {
    let text = prompt_text(messages);
    let start = text.find("You review the '")? + "You review the '".len();
    let len = text[start..].find('\'')?;
    Some(text[start..start + len].to_string())
}

pub(super) fn draft(score: u8) -> String {
    json!({
        "analysis": "Covered with evidence.",
        "recommendations": ["Add a baseline"],
        "potential_pitfalls": [],
        "supported_points": ["Mobile drop-off"],
        "score": score
    })
    .to_string()
}

/// Answers query prompts with one query and section prompts with the
/// score listed for that section (3 when unlisted).
pub(super) fn scripted(scores: HashMap<String, u8>) -> ScriptedLlm {
    ScriptedLlm::new(move |messages| {
        let Some(name) = section_of(messages) else {
            return Ok(json!({"queries": ["mobile checkout"]}).to_string());
        };
        Ok(draft(scores.get(&name).copied().unwrap_or(3)))
    })
}

pub(super) fn engine(
    llm: ScriptedLlm,
    planner: Arc<dyn Planner>,
    augmenter: Option<Arc<WebSearchAugmenter>>,
    llm_timeout: Duration,
) -> Arc<AnalysisEngine> {
    let client = LlmClient::new(Arc::new(llm), "test-model")
        .with_timeout(llm_timeout)
        .with_schema_retries(0);
    let index = FakeIndex::new(vec![
        retrieved("Churn interviews", CorpusCategory::Research, "mobile users quit at forms", 0.9),
        retrieved("Funnel dashboard", CorpusCategory::Analytics, "62% drop at payment", 0.7),
    ]);
    let retrieval = Arc::new(RetrievalService::new(
        Arc::new(index),
        None,
        Duration::from_millis(500),
        2,
    ));
    let analyzer = Arc::new(SectionAnalyzer::new(
        client,
        retrieval,
        AnalyzerSettings::from(&RetrievalSettings::default()),
    ));
    Arc::new(AnalysisEngine::new(
        planner,
        analyzer,
        augmenter,
        Duration::from_secs(2),
    ))
}

pub(super) fn kinds(events: &[JobEvent]) -> Vec<&'static str> {
    events.iter().map(JobEvent::kind).collect()
}
