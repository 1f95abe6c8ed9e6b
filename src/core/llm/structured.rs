use serde::de::DeserializeOwned;

use crate::core::error::GenerationError;

/// A record the model must return as JSON. Deserialization enforces that
/// every field is present; [`StructuredOutput::validate`] covers the rest.
pub trait StructuredOutput: DeserializeOwned + Send {
    const SCHEMA_HINT: &'static str;

    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Extract a JSON block from LLM output. Tries fenced ```json ... ``` first,
/// then raw JSON starting with `{` or `[`, then the outermost `{ ... }` span.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let content_start = start + 7;
        if let Some(end) = trimmed[content_start..].find("```") {
            let block = trimmed[content_start..content_start + end].trim();
            if !block.is_empty() {
                return Some(block);
            }
        }
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Some(trimmed);
    }
    let open = trimmed.find('{')?;
    let close = trimmed.rfind('}')?;
    (close > open).then(|| &trimmed[open..=close])
}

pub fn parse_structured<T: StructuredOutput>(raw: &str) -> Result<T, GenerationError> {
    let json = extract_json_block(raw)
        .ok_or_else(|| GenerationError::Schema("no JSON object in response".to_string()))?;
    let value: T =
        serde_json::from_str(json).map_err(|e| GenerationError::Schema(e.to_string()))?;
    value.validate().map_err(GenerationError::Schema)?;
    Ok(value)
}
