//! Generation and media collaborators.
//!
//! The orchestration core only sees [`Generator`] and [`MediaSynthesizer`]:
//! success or [`ProviderError`]. Retry internals live in [`retry`], the HTTP
//! client in [`gemini`].

pub mod gemini;
pub mod parse;
pub mod retry;
pub mod wav;

use async_trait::async_trait;

use crate::context::SpeechClip;

pub use gemini::{GeminiClient, GeminiMedia};
pub use parse::{is_empty_structure, parse_structured};
pub use retry::{retry_with_backoff, RetryPolicy, RetryingGenerator};

/// Errors surfaced by the generation adapter after its retry policy.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("no API key configured")]
    MissingApiKey,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("provider returned no content")]
    EmptyResponse,

    #[error("failed to decode provider payload: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("generation failed: {0}")]
    Failed(String),
}

impl ProviderError {
    /// Quota and rate-limit failures back off twice as long.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            ProviderError::RateLimited(_) => true,
            ProviderError::Api { status: 429, .. } => true,
            other => {
                let text = other.to_string().to_uppercase();
                text.contains("429") || text.contains("QUOTA") || text.contains("LIMIT")
            }
        }
    }

    /// Configuration failures never succeed on retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::MissingApiKey)
    }
}

/// Model tier a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Fast,
    Research,
}

/// Shape of the expected response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Text,
}

/// One call to the generation service.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Label of the calling agent, used for logging and by scripted fakes.
    pub agent: String,
    pub prompt: String,
    pub tier: ModelTier,
    pub format: ResponseFormat,
    /// Ask the provider to ground the answer with web search.
    pub grounded: bool,
}

impl GenerationRequest {
    pub fn json(agent: &str, prompt: impl Into<String>) -> Self {
        Self {
            agent: agent.to_string(),
            prompt: prompt.into(),
            tier: ModelTier::Fast,
            format: ResponseFormat::Json,
            grounded: false,
        }
    }

    pub fn text(agent: &str, prompt: impl Into<String>) -> Self {
        Self {
            format: ResponseFormat::Text,
            ..Self::json(agent, prompt)
        }
    }

    pub fn research(mut self) -> Self {
        self.tier = ModelTier::Research;
        self
    }

    pub fn grounded(mut self) -> Self {
        self.grounded = true;
        self
    }
}

/// Text generation service.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn invoke(&self, request: &GenerationRequest) -> Result<String, ProviderError>;
}

/// Image and speech synthesis service.
#[async_trait]
pub trait MediaSynthesizer: Send + Sync {
    /// Render `prompt` and return the written file name.
    async fn render_image(
        &self,
        prompt: &str,
        project_id: &str,
        suffix: &str,
    ) -> Result<String, ProviderError>;

    /// Narrate `text` for block `index` and return the written clip.
    async fn synthesize_speech(
        &self,
        text: &str,
        project_id: &str,
        index: usize,
    ) -> Result<SpeechClip, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_detection() {
        assert!(ProviderError::RateLimited("slow down".into()).is_rate_limit());
        assert!(ProviderError::Api {
            status: 429,
            message: String::new()
        }
        .is_rate_limit());
        assert!(ProviderError::Failed("Quota exceeded".into()).is_rate_limit());
        assert!(!ProviderError::EmptyResponse.is_rate_limit());
    }

    #[test]
    fn missing_key_is_not_retryable() {
        assert!(!ProviderError::MissingApiKey.is_retryable());
        assert!(ProviderError::EmptyResponse.is_retryable());
    }

    #[test]
    fn request_builders() {
        let req = GenerationRequest::text("DeepResearcher", "dig").research().grounded();
        assert_eq!(req.format, ResponseFormat::Text);
        assert_eq!(req.tier, ModelTier::Research);
        assert!(req.grounded);
    }
}
