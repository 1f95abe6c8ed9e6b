use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::error::MergeError;
use crate::core::retrieval::RetrievalStrategy;

pub const SCORE_MIN: u8 = 0;
pub const SCORE_MAX: u8 = 5;
/// Score carried by a degraded section.
pub const SENTINEL_SCORE: u8 = SCORE_MIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Planning,
    Analyzing,
    Augmenting,
    Compiling,
    Completed,
    Failed,
    Canceled,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Planning => "planning",
            JobState::Analyzing => "analyzing",
            JobState::Augmenting => "augmenting",
            JobState::Compiling => "compiling",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Canceled => "canceled",
        }
    }

    #[cfg(test)]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Canceled
        )
    }

    /// Coarse status reported outside the orchestrator.
    pub fn status(self) -> JobStatus {
        match self {
            JobState::Created => JobStatus::Pending,
            JobState::Planning
            | JobState::Analyzing
            | JobState::Augmenting
            | JobState::Compiling => JobStatus::Running,
            JobState::Completed => JobStatus::Completed,
            JobState::Failed | JobState::Canceled => JobStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub name: String,
    pub goal: String,
    pub order: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionResult {
    pub name: String,
    pub analysis: String,
    pub recommendations: Vec<String>,
    pub pitfalls: Vec<String>,
    pub supported_points: Vec<String>,
    pub score: u8,
    pub sources: Vec<String>,
    #[serde(default)]
    pub degraded: bool,
}

impl SectionResult {
    /// Stand-in for a section whose analysis could not be produced.
    pub fn degraded(name: &str, reason: &str, sources: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            analysis: format!("Analysis unavailable for {}: {}", name, reason),
            recommendations: Vec::new(),
            pitfalls: Vec::new(),
            supported_points: Vec::new(),
            score: SENTINEL_SCORE,
            sources,
            degraded: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    /// URL of the web result backing this suggestion.
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSource {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSuggestion {
    pub hypotheses: Vec<Suggestion>,
    pub considerations: Vec<Suggestion>,
    pub sources: Vec<WebSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalReport {
    pub document_title: String,
    pub sections: Vec<SectionResult>,
    pub web: Option<WebSuggestion>,
    pub aggregate_score: u8,
    pub content: String,
}

/// Per-job overrides of the engine's configured behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobOptions {
    pub strategy: Option<RetrievalStrategy>,
}

/// One analysis run. Owned by the orchestrator task for its whole life.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub job_id: String,
    pub document_id: String,
    state: JobState,
    plan: Vec<SectionSpec>,
    results: IndexMap<String, SectionResult>,
    logs: Vec<String>,
    report: Option<FinalReport>,
    error: Option<String>,
}

impl AnalysisJob {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            state: JobState::Created,
            plan: Vec::new(),
            results: IndexMap::new(),
            logs: Vec::new(),
            report: None,
            error: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    /// Moves to `to` when the state machine allows it; returns whether it did.
    pub fn advance(&mut self, to: JobState) -> bool {
        if super::can_transition(self.state, to) {
            self.state = to;
            true
        } else {
            false
        }
    }

    pub fn plan(&self) -> &[SectionSpec] {
        &self.plan
    }

    pub fn set_plan(&mut self, plan: Vec<SectionSpec>) {
        self.plan = plan;
    }

    /// The only write path for section results. Keys are section names and
    /// each may be written once, so completion order cannot lose or
    /// duplicate entries.
    pub fn merge(&mut self, result: SectionResult) -> Result<(), MergeError> {
        if !self.plan.is_empty() && !self.plan.iter().any(|s| s.name == result.name) {
            return Err(MergeError::UnknownSection(result.name));
        }
        if self.results.contains_key(&result.name) {
            return Err(MergeError::DuplicateSection(result.name));
        }
        self.results.insert(result.name.clone(), result);
        Ok(())
    }

    /// Results in completion order.
    pub fn results(&self) -> &IndexMap<String, SectionResult> {
        &self.results
    }

    pub fn push_log(&mut self, message: impl Into<String>) {
        self.logs.push(message.into());
    }

    pub fn extend_logs(&mut self, entries: impl IntoIterator<Item = String>) {
        self.logs.extend(entries);
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn report(&self) -> Option<&FinalReport> {
        self.report.as_ref()
    }

    pub fn set_report(&mut self, report: FinalReport) {
        self.report = Some(report);
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.advance(JobState::Failed);
    }

    pub fn cancel(&mut self) {
        if self.advance(JobState::Canceled) {
            self.error = Some("canceled".to_string());
        }
    }
}
