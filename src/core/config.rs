use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::core::retrieval::{CorpusCategory, RetrievalStrategy};

pub const CONFIG_ENV: &str = "PRD_REVIEW_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "prd-review.toml";

pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
pub const COHERE_KEY_ENV: &str = "COHERE_API_KEY";
pub const TAVILY_KEY_ENV: &str = "TAVILY_API_KEY";

pub const MIN_PLAN_SECTIONS: usize = 4;
pub const MAX_PLAN_SECTIONS: usize = 6;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub llm: LlmSettings,
    pub embeddings: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub rerank: RerankSettings,
    pub web_search: WebSearchSettings,
    pub plan: PlanSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 17890,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub database: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database: PathBuf::from("prd-review.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Extra attempts after a response fails schema validation.
    pub schema_retries: u32,
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4.1".to_string(),
            api_key: None,
            timeout_secs: 60,
            schema_retries: 1,
            temperature: 0.1,
        }
    }
}

impl LlmSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Defaults to the chat provider's base URL when unset.
    pub base_url: Option<String>,
    pub model: String,
    pub dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub strategy: RetrievalStrategy,
    pub top_k: usize,
    pub overfetch: usize,
    pub queries_per_section: usize,
    pub timeout_secs: u64,
    pub categories: Vec<CorpusCategory>,
    pub fallback_query: String,
    pub fallback_limit: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            strategy: RetrievalStrategy::Plain,
            top_k: 5,
            overfetch: 3,
            queries_per_section: 2,
            timeout_secs: 20,
            categories: vec![CorpusCategory::Research, CorpusCategory::Analytics],
            fallback_query: "research analytics user behavior".to_string(),
            fallback_limit: 2,
        }
    }
}

impl RetrievalSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Over-fetch multiplier for the compressed strategy, kept within 2..=3.
    pub fn overfetch_multiplier(&self) -> usize {
        self.overfetch.clamp(2, 3)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSettings {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.cohere.com/v2".to_string(),
            model: "rerank-v3.5".to_string(),
            api_key: None,
            timeout_secs: 20,
        }
    }
}

impl RerankSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchSettings {
    pub enabled: bool,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub max_results: usize,
    pub num_queries: usize,
    pub max_chars_per_source: usize,
    pub context_char_budget: usize,
    pub timeout_secs: u64,
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.tavily.com".to_string(),
            api_key: None,
            max_results: 5,
            num_queries: 3,
            max_chars_per_source: 2000,
            context_char_budget: 12_000,
            timeout_secs: 30,
        }
    }
}

impl WebSearchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionTemplate {
    pub name: String,
    pub goal: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanSettings {
    pub min_content_chars: usize,
    pub timeout_secs: u64,
    /// Replaces the built-in section catalogue when non-empty.
    pub sections: Vec<SectionTemplate>,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            min_content_chars: 50,
            timeout_secs: 30,
            sections: Vec::new(),
        }
    }
}

impl PlanSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Resolve the config file (`explicit`, then `$PRD_REVIEW_CONFIG`, then
    /// `./prd-review.toml`), apply secrets from the environment and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .or_else(|| {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                local.exists().then_some(local)
            });

        let mut settings = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(&p)
                    .with_context(|| format!("failed to read config {}", p.display()))?;
                Self::from_toml_str(&raw)
                    .with_context(|| format!("invalid config {}", p.display()))?
            }
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Environment secrets win over whatever the file carries.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_empty(OPENAI_KEY_ENV) {
            self.llm.api_key = Some(key);
        }
        if let Some(key) = non_empty(COHERE_KEY_ENV) {
            self.rerank.api_key = Some(key);
        }
        if let Some(key) = non_empty(TAVILY_KEY_ENV) {
            self.web_search.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be at least 1");
        }
        if self.retrieval.queries_per_section == 0 {
            bail!("retrieval.queries_per_section must be at least 1");
        }
        if self.embeddings.dimensions == 0 {
            bail!("embeddings.dimensions must be at least 1");
        }
        let sections = &self.plan.sections;
        if !sections.is_empty() {
            if sections.len() < MIN_PLAN_SECTIONS || sections.len() > MAX_PLAN_SECTIONS {
                bail!(
                    "plan.sections must list between {} and {} sections, got {}",
                    MIN_PLAN_SECTIONS,
                    MAX_PLAN_SECTIONS,
                    sections.len()
                );
            }
            let mut seen = HashSet::new();
            for s in sections {
                if s.name.trim().is_empty() {
                    bail!("plan.sections entries need a name");
                }
                if !seen.insert(s.name.to_lowercase()) {
                    bail!("duplicate plan section '{}'", s.name);
                }
            }
        }
        Ok(())
    }

    /// Rerank is only wired when a key is present.
    pub fn rerank_enabled(&self) -> bool {
        self.rerank.api_key.is_some()
    }

    pub fn web_search_enabled(&self) -> bool {
        self.web_search.enabled && self.web_search.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.server.port, 17890);
        assert_eq!(s.llm.model, "gpt-4.1");
        assert_eq!(s.retrieval.top_k, 5);
        assert_eq!(s.retrieval.queries_per_section, 2);
        assert_eq!(s.retrieval.strategy, RetrievalStrategy::Plain);
        assert_eq!(s.web_search.num_queries, 3);
        assert_eq!(s.rerank.model, "rerank-v3.5");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn shipped_example_config_parses_and_validates() {
        let s = Settings::from_toml_str(include_str!("../../prd-review.example.toml"))
            .expect("example config should parse");
        assert!(s.validate().is_ok());
        assert_eq!(s.retrieval.categories.len(), 2);
        assert_eq!(s.rerank.timeout(), Duration::from_secs(20));
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_keys() {
        let s = Settings::from_toml_str(
            r#"
            [retrieval]
            strategy = "compressed"
            top_k = 8

            [server]
            port = 9000
            "#,
        )
        .expect("config should parse");
        assert_eq!(s.retrieval.strategy, RetrievalStrategy::Compressed);
        assert_eq!(s.retrieval.top_k, 8);
        assert_eq!(s.retrieval.queries_per_section, 2);
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.server.host, "127.0.0.1");
    }

    #[test]
    fn env_secrets_override_file_values() {
        let mut s = Settings::from_toml_str(
            r#"
            [llm]
            api_key = "from-file"
            "#,
        )
        .expect("config should parse");
        s.apply_env(|key| match key {
            OPENAI_KEY_ENV => Some("from-env".to_string()),
            COHERE_KEY_ENV => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(s.llm.api_key.as_deref(), Some("from-env"));
        assert!(s.rerank.api_key.is_none(), "blank env values are ignored");
        assert!(!s.rerank_enabled());
    }

    #[test]
    fn overfetch_multiplier_is_clamped() {
        let mut s = Settings::default();
        s.retrieval.overfetch = 10;
        assert_eq!(s.retrieval.overfetch_multiplier(), 3);
        s.retrieval.overfetch = 1;
        assert_eq!(s.retrieval.overfetch_multiplier(), 2);
    }

    #[test]
    fn custom_plan_outside_bounds_is_rejected() {
        let mut s = Settings::default();
        s.plan.sections = vec![
            SectionTemplate {
                name: "One".into(),
                goal: "g".into(),
            },
            SectionTemplate {
                name: "Two".into(),
                goal: "g".into(),
            },
        ];
        assert!(s.validate().is_err());
    }

    #[test]
    fn duplicate_plan_sections_are_rejected() {
        let mut s = Settings::default();
        s.plan.sections = ["A", "B", "C", "a"]
            .iter()
            .map(|n| SectionTemplate {
                name: n.to_string(),
                goal: "g".into(),
            })
            .collect();
        let err = s.validate().expect_err("duplicate names should fail");
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn web_search_needs_a_key() {
        let mut s = Settings::default();
        assert!(!s.web_search_enabled());
        s.web_search.api_key = Some("k".into());
        assert!(s.web_search_enabled());
        s.web_search.enabled = false;
        assert!(!s.web_search_enabled());
    }
}
