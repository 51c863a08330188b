//! Gemini REST client.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::retry::{retry_with_backoff, RetryPolicy};
use super::wav;
use super::{GenerationRequest, Generator, MediaSynthesizer, ModelTier, ProviderError, ResponseFormat};
use crate::context::SpeechClip;
use crate::settings::ModelSettings;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Single-shot `generateContent` client. Wrap in
/// [`super::RetryingGenerator`] for backoff.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    models: ModelSettings,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, models: ModelSettings) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("reelswarm/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(180))
            .build()?;

        Ok(Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            models,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different endpoint (proxies, local mocks).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate_content(&self, model: &str, body: &Value) -> Result<Value, ProviderError> {
        let key = self.api_key.as_deref().ok_or(ProviderError::MissingApiKey)?;
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::RateLimited(message));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl Generator for GeminiClient {
    #[instrument(skip(self, request), fields(agent = %request.agent))]
    async fn invoke(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let model = match request.tier {
            ModelTier::Fast => &self.models.fast,
            ModelTier::Research => &self.models.research,
        };
        let body = text_request_body(request);
        let response = self.generate_content(model, &body).await?;
        let text = extract_text(&response).ok_or(ProviderError::EmptyResponse)?;
        debug!(chars = text.len(), "generation complete");
        Ok(text)
    }
}

/// Request body for a text or JSON generation.
pub fn text_request_body(request: &GenerationRequest) -> Value {
    let mut body = json!({
        "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
    });
    if request.format == ResponseFormat::Json && !request.grounded {
        body["generationConfig"] = json!({ "responseMimeType": "application/json" });
    }
    if request.grounded {
        body["tools"] = json!([{ "google_search": {} }]);
    }
    body
}

/// Concatenated text parts of the first candidate.
pub fn extract_text(response: &Value) -> Option<String> {
    let parts = response
        .pointer("/candidates/0/content/parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Base64 payload of the first inline-data part.
pub fn extract_inline_data(response: &Value) -> Option<&str> {
    response
        .pointer("/candidates/0/content/parts")?
        .as_array()?
        .iter()
        .find_map(|p| {
            p.get("inlineData")
                .or_else(|| p.get("inline_data"))
                .and_then(|d| d.get("data"))
                .and_then(Value::as_str)
        })
}

/// Image and narration rendering on top of [`GeminiClient`].
///
/// Files land in `<output_dir>/images/{project_id}_{suffix}.png` and
/// `<output_dir>/audio/{project_id}_{index}.wav`; the returned names are
/// relative to those folders.
pub struct GeminiMedia {
    client: GeminiClient,
    voice_name: String,
    output_dir: PathBuf,
    retry: RetryPolicy,
}

impl GeminiMedia {
    pub fn new(
        client: GeminiClient,
        voice_name: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            voice_name: voice_name.into(),
            output_dir: output_dir.into(),
            retry,
        }
    }

    async fn inline_bytes(&self, model: &str, body: &Value, label: &str) -> Result<Vec<u8>, ProviderError> {
        retry_with_backoff(&self.retry, label, || async move {
            let response = self.client.generate_content(model, body).await?;
            let data = extract_inline_data(&response).ok_or(ProviderError::EmptyResponse)?;
            BASE64
                .decode(data)
                .map_err(|e| ProviderError::Decode(e.to_string()))
        })
        .await
    }

    async fn write(&self, folder: &str, filename: &str, bytes: &[u8]) -> Result<(), ProviderError> {
        let dir = self.output_dir.join(folder);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(filename), bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl MediaSynthesizer for GeminiMedia {
    #[instrument(skip(self, prompt))]
    async fn render_image(
        &self,
        prompt: &str,
        project_id: &str,
        suffix: &str,
    ) -> Result<String, ProviderError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseModalities": ["IMAGE"] },
        });
        let bytes = self
            .inline_bytes(&self.client.models.image, &body, "image")
            .await?;

        let filename = format!("{project_id}_{suffix}.png");
        self.write("images", &filename, &bytes).await?;
        Ok(filename)
    }

    #[instrument(skip(self, text))]
    async fn synthesize_speech(
        &self,
        text: &str,
        project_id: &str,
        index: usize,
    ) -> Result<SpeechClip, ProviderError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": self.voice_name } }
                }
            },
        });
        let pcm = self
            .inline_bytes(&self.client.models.audio, &body, "speech")
            .await?;

        let filename = format!("{project_id}_{index}.wav");
        self.write("audio", &filename, &wav::encode_pcm16(&pcm))
            .await?;
        Ok(SpeechClip {
            file: filename,
            duration_seconds: wav::pcm16_duration_seconds(pcm.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_requests_set_mime_type() {
        let body = text_request_body(&GenerationRequest::json("TrendHunter", "find trends"));
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn grounded_requests_use_search_tool() {
        let body = text_request_body(&GenerationRequest::text("DeepResearcher", "dig").grounded());
        assert!(body["tools"][0].get("google_search").is_some());
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn extract_text_joins_parts() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Hello, " }, { "text": "world" }] } }]
        });
        assert_eq!(extract_text(&response).as_deref(), Some("Hello, world"));
        assert!(extract_text(&json!({"candidates": []})).is_none());
    }

    #[test]
    fn extract_inline_data_accepts_both_casings() {
        let camel = json!({
            "candidates": [{ "content": { "parts": [{ "inlineData": { "data": "QUJD" } }] } }]
        });
        let snake = json!({
            "candidates": [{ "content": { "parts": [{ "inline_data": { "data": "QUJD" } }] } }]
        });
        assert_eq!(extract_inline_data(&camel), Some("QUJD"));
        assert_eq!(extract_inline_data(&snake), Some("QUJD"));
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let client = GeminiClient::new(None, ModelSettings::default()).unwrap();
        let err = client
            .invoke(&GenerationRequest::text("Editor", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey));
    }
}
