pub mod providers;
pub mod structured;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::error::GenerationError;
pub use structured::{StructuredOutput, extract_json_block, parse_structured};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationOptions {
    /// Ask the provider to constrain output to a JSON object.
    pub json_mode: bool,
    pub temperature: Option<f32>,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    async fn generate(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        options: GenerationOptions,
    ) -> Result<String>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// A provider bound to one model, with the timeout and retry policy every
/// structured call in a job shares.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    model: String,
    timeout: Duration,
    temperature: f32,
    schema_retries: u32,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        let model = model.into();
        info!("LLM client ready: {} ({})", provider.provider_name(), model);
        Self {
            provider,
            model,
            timeout: Duration::from_secs(60),
            temperature: 0.1,
            schema_retries: 1,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_schema_retries(mut self, retries: u32) -> Self {
        self.schema_retries = retries;
        self
    }

    /// One structured call: timeout, provider errors and schema failures all
    /// come back as [`GenerationError`].
    pub async fn complete<T: StructuredOutput>(
        &self,
        messages: &[ChatMessage],
    ) -> Result<T, GenerationError> {
        let mut request = Vec::with_capacity(messages.len() + 1);
        request.extend_from_slice(messages);
        request.push(ChatMessage::system(format!(
            "Respond with a single JSON object and nothing else. Every field is required. Shape:\n{}",
            T::SCHEMA_HINT
        )));

        let options = GenerationOptions {
            json_mode: true,
            temperature: Some(self.temperature),
        };
        let call = self.provider.generate(&self.model, &request, options);
        let raw = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => {
                return Err(GenerationError::Timeout {
                    secs: self.timeout.as_secs(),
                });
            }
            Ok(Err(e)) => return Err(GenerationError::Provider(e.to_string())),
            Ok(Ok(raw)) => raw,
        };
        parse_structured(&raw)
    }

    /// [`Self::complete`] with the configured number of extra attempts.
    pub async fn complete_with_retry<T: StructuredOutput>(
        &self,
        messages: &[ChatMessage],
    ) -> Result<T, GenerationError> {
        let attempts = self.schema_retries + 1;
        let mut last_err = GenerationError::Provider("no attempt made".to_string());
        for attempt in 1..=attempts {
            match self.complete::<T>(messages).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!("Generation attempt {}/{} failed: {}", attempt, attempts, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}
