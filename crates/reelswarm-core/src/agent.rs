//! Agent contract.
//!
//! An agent reads a fixed subset of the [`Context`](crate::context::Context)
//! through a [`Scope`], calls the generation service, and returns values for
//! the fields it declared in [`Agent::writes`]. Failures never escape an
//! agent: it returns fallback values and reports [`Outcome::Fallback`].

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::{ContextField, FieldValue, Scope};
use crate::error::SwarmError;
use crate::provider::{is_empty_structure, parse_structured, GenerationRequest, Generator, ProviderError};

/// How an agent's run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Some or all output is a fallback value.
    Fallback { reason: String },
}

/// Values produced by one agent run.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutput {
    pub values: Vec<FieldValue>,
    pub outcome: Outcome,
}

impl AgentOutput {
    pub fn completed(values: Vec<FieldValue>) -> Self {
        Self {
            values,
            outcome: Outcome::Completed,
        }
    }

    pub fn fallback(values: Vec<FieldValue>, reason: impl fmt::Display) -> Self {
        Self {
            values,
            outcome: Outcome::Fallback {
                reason: reason.to_string(),
            },
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.outcome, Outcome::Fallback { .. })
    }
}

/// A unit of pipeline work bound to specific context fields.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable label used in logs, notifications and provider requests.
    fn name(&self) -> &'static str;

    /// Fields this agent may write. Parallel siblings must not overlap.
    fn writes(&self) -> &'static [ContextField];

    /// Produce this agent's output. Must not fail.
    async fn run(&self, scope: &Scope<'_>) -> AgentOutput;
}

/// Why an agent fell back.
#[derive(Debug, thiserror::Error)]
pub enum AgentFailure {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("response could not be parsed")]
    Unparseable,

    #[error("response was empty")]
    Empty,

    #[error("response missing {0}")]
    Missing(&'static str),
}

impl From<AgentFailure> for SwarmError {
    fn from(failure: AgentFailure) -> Self {
        match failure {
            AgentFailure::Provider(e) => SwarmError::Provider(e),
            other => SwarmError::Provider(ProviderError::Failed(other.to_string())),
        }
    }
}

/// Call the generator and parse a non-empty JSON structure.
pub async fn ask_json(
    generator: &dyn Generator,
    request: GenerationRequest,
) -> Result<Value, AgentFailure> {
    let raw = generator.invoke(&request).await?;
    let value = parse_structured(&raw);
    if is_empty_structure(&value) {
        return Err(AgentFailure::Unparseable);
    }
    Ok(value)
}

/// Call the generator and return trimmed, non-empty text.
pub async fn ask_text(
    generator: &dyn Generator,
    request: GenerationRequest,
) -> Result<String, AgentFailure> {
    let raw = generator.invoke(&request).await?;
    let text = raw.trim();
    if text.is_empty() {
        return Err(AgentFailure::Empty);
    }
    Ok(text.to_string())
}

/// Deserialize a list found either at the top level or under one of `keys`.
pub fn list_at<T: DeserializeOwned>(value: &Value, keys: &[&str]) -> Option<Vec<T>> {
    let list = if value.is_array() {
        value.clone()
    } else {
        keys.iter().find_map(|k| value.get(*k).filter(|v| v.is_array()))?.clone()
    };
    serde_json::from_value::<Vec<T>>(list)
        .ok()
        .filter(|items| !items.is_empty())
}

/// Truncate to at most `max` characters.
pub fn clip(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_at_reads_top_level_or_keyed() {
        let top: Option<Vec<String>> = list_at(&json!(["a", "b"]), &["items"]);
        assert_eq!(top, Some(vec!["a".to_string(), "b".to_string()]));

        let keyed: Option<Vec<String>> = list_at(&json!({"items": ["c"]}), &["other", "items"]);
        assert_eq!(keyed, Some(vec!["c".to_string()]));

        let empty: Option<Vec<String>> = list_at(&json!({"items": []}), &["items"]);
        assert!(empty.is_none());

        let wrong: Option<Vec<u32>> = list_at(&json!(["x"]), &[]);
        assert!(wrong.is_none());
    }

    #[test]
    fn fallback_output_reports_reason() {
        let out = AgentOutput::fallback(vec![], AgentFailure::Missing("selected_topic"));
        assert!(out.is_fallback());
        assert_eq!(
            out.outcome,
            Outcome::Fallback {
                reason: "response missing selected_topic".to_string()
            }
        );
    }

    #[test]
    fn clip_counts_chars() {
        assert_eq!(clip("héllo", 2), "hé");
    }
}
