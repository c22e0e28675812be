//! Text-generation port
//!
//! Every natural-language step (profiling, session authoring, feedback
//! simulation, path revision) goes through [`TextGenerator`]. The core never
//! talks to a vendor directly; `llm::LlmGenerator` is one adapter.

pub mod llm;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use crate::error::{Error, Result};

/// Which component is asking; adapters may route roles to different models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationRole {
    Profiler,
    Scheduler,
    Simulator,
}

impl std::fmt::Display for GenerationRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationRole::Profiler => write!(f, "profiler"),
            GenerationRole::Scheduler => write!(f, "scheduler"),
            GenerationRole::Simulator => write!(f, "simulator"),
        }
    }
}

/// A system instruction plus the concrete task
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub role: GenerationRole,
    pub system: String,
    pub task: String,
}

impl Prompt {
    pub fn new(role: GenerationRole, system: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            role,
            system: system.into(),
            task: task.into(),
        }
    }
}

/// External text-generation capability.
///
/// `schema` is the JSON output template the answer must follow; the
/// returned value is the parsed JSON. Implementations map transport failures
/// to [`Error::Generation`] and unparsable answers to [`Error::Schema`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &Prompt, schema: &str) -> Result<Value>;
}

/// Run one generation call under the caller's time budget
pub async fn generate_with_timeout(
    generator: &dyn TextGenerator,
    prompt: &Prompt,
    schema: &str,
    timeout: Duration,
) -> Result<Value> {
    match tokio::time::timeout(timeout, generator.generate(prompt, schema)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("{} generation exceeded {:?}", prompt.role, timeout);
            Err(Error::Timeout(timeout.as_secs()))
        }
    }
}

/// Pull a JSON document out of a model answer.
///
/// Accepts bare JSON, JSON inside a fenced code block, or JSON surrounded by
/// prose.
pub fn extract_json(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::Schema("empty response".to_string()));
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    if let Some(fenced) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(fenced) {
            return Ok(value);
        }
    }

    let start = trimmed.find(['{', '[']);
    let end = trimmed.rfind(['}', ']']);
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            return serde_json::from_str(&trimmed[start..=end])
                .map_err(|e| Error::Schema(format!("response is not valid JSON: {}", e)));
        }
    }

    Err(Error::Schema(format!(
        "no JSON found in response: {}",
        truncate(trimmed, 120)
    )))
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let rest = &text[open + 3..];
    // Skip the language tag line
    let body_start = rest.find('\n')? + 1;
    let body = &rest[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// Truncate on a char boundary
pub(crate) fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
