use async_trait::async_trait;

use crate::core::config::{MAX_PLAN_SECTIONS, PlanSettings, SectionTemplate};
use crate::core::document::Document;
use crate::core::error::PlanningError;
use crate::core::orchestrator::types::SectionSpec;

#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, document: &Document) -> Result<Vec<SectionSpec>, PlanningError>;
}

fn template(name: &str, goal: &str) -> SectionTemplate {
    SectionTemplate {
        name: name.to_string(),
        goal: goal.to_string(),
    }
}

pub fn core_sections() -> Vec<SectionTemplate> {
    vec![
        template(
            "Audience",
            "Assess whether the target users are clearly defined, segmented, and backed by research \
             on their behavior and needs.",
        ),
        template(
            "Problem",
            "Assess whether the problem is specific, evidenced by research or analytics, and \
             significant enough to solve.",
        ),
        template(
            "Solution",
            "Assess whether the proposed solution addresses the stated problem, is feasible, and \
             considers alternatives.",
        ),
        template(
            "Go-To-Market",
            "Assess the launch plan, positioning, channels, and rollout strategy.",
        ),
        template(
            "Success Metrics",
            "Assess whether success metrics are measurable, tied to the problem, and have baselines \
             and targets.",
        ),
    ]
}

pub fn risk_section() -> SectionTemplate {
    template(
        "Risks & Dependencies",
        "Assess whether risks, dependencies, and open assumptions are identified with mitigations.",
    )
}

const RISK_TERMS: &[&str] = &[
    "risk",
    "risks",
    "dependency",
    "dependencies",
    "assumption",
    "assumptions",
    "mitigation",
    "mitigations",
];

fn mentions_risks(content: &str) -> bool {
    content
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| RISK_TERMS.contains(&word.to_lowercase().as_str()))
}

/// Plans from a fixed section catalogue. The built-in catalogue adds the
/// risk section only for documents that talk about risks or dependencies.
pub struct CatalogPlanner {
    custom: Option<Vec<SectionTemplate>>,
    min_content_chars: usize,
}

impl CatalogPlanner {
    pub fn new(settings: &PlanSettings) -> Self {
        Self {
            custom: (!settings.sections.is_empty()).then(|| settings.sections.clone()),
            min_content_chars: settings.min_content_chars,
        }
    }
}

#[async_trait]
impl Planner for CatalogPlanner {
    async fn plan(&self, document: &Document) -> Result<Vec<SectionSpec>, PlanningError> {
        let content = document.content.trim();
        if content.is_empty() {
            return Err(PlanningError::EmptyDocument);
        }
        let len = content.chars().count();
        if len < self.min_content_chars {
            return Err(PlanningError::TooShort {
                len,
                min: self.min_content_chars,
            });
        }

        let templates = match &self.custom {
            Some(sections) => sections.clone(),
            None => {
                let mut sections = core_sections();
                if mentions_risks(content) {
                    sections.push(risk_section());
                }
                sections
            }
        };

        Ok(templates
            .into_iter()
            .take(MAX_PLAN_SECTIONS)
            .enumerate()
            .map(|(order, t)| SectionSpec {
                name: t.name,
                goal: t.goal,
                order,
            })
            .collect())
    }
}
