//! Asset department: art direction, image prompts, thumbnail, audio notes, SEO.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Value};

use crate::agent::{ask_json, ask_text, Agent, AgentFailure, AgentOutput};
use crate::context::{script_text, value_str, ContextField, FieldValue, Scope, VisualPrompt};
use crate::provider::{GenerationRequest, Generator};

/// Prompt used for a block whose prompt could not be generated.
pub const FALLBACK_VISUAL_PROMPT: &str = "Cinematic shot";

/// Defines the visual language of the video.
pub struct ArtDirector {
    generator: Arc<dyn Generator>,
}

impl ArtDirector {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub fn fallback() -> Value {
        json!({
            "visual_style": { "aesthetic": "Cinematic documentary, dramatic lighting" }
        })
    }
}

#[async_trait]
impl Agent for ArtDirector {
    fn name(&self) -> &'static str {
        "ArtDirector"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::ArtDirection]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let prompt = format!(
            "Define the art direction for a documentary about \"{}\".\nScript:\n{}\n\
             Respond with JSON: {{\"visual_style\": {{\"aesthetic\", \"color_palette\", \"lighting\", \"camera\"}}}}",
            scope.topic(),
            script_text(scope.final_script(), 6_000),
        );

        let result = ask_json(self.generator.as_ref(), GenerationRequest::json(self.name(), prompt))
            .await
            .and_then(|v| {
                if v.get("visual_style").is_some() {
                    Ok(v)
                } else {
                    Err(AgentFailure::Missing("visual_style"))
                }
            });

        match result {
            Ok(direction) => AgentOutput::completed(vec![FieldValue::ArtDirection(direction)]),
            Err(e) => AgentOutput::fallback(vec![FieldValue::ArtDirection(Self::fallback())], e),
        }
    }
}

/// Writes one image prompt per final-script block.
pub struct PromptEngineer {
    generator: Arc<dyn Generator>,
}

impl PromptEngineer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

/// Build the image-prompt request for one narration line.
pub fn visual_prompt_request(agent: &str, art_direction: &Value, section: &str, narration: &str) -> GenerationRequest {
    let aesthetic = value_str(art_direction, &["visual_style", "aesthetic"]).unwrap_or("cinematic");
    GenerationRequest::text(
        agent,
        format!(
            "Write one detailed image-generation prompt (English, no text in image) illustrating \
             this narration.\nStyle: {aesthetic}\nSection: {section}\nNarration: {narration}\n\
             Reply with the prompt only."
        ),
    )
}

#[async_trait]
impl Agent for PromptEngineer {
    fn name(&self) -> &'static str {
        "PromptEngineer"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::VisualPrompts]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let art = scope.art_direction();
        let calls = scope.final_script().iter().map(|block| {
            let request = visual_prompt_request(self.name(), art, &block.section, &block.narration);
            async move {
                let prompt = ask_text(self.generator.as_ref(), request).await;
                (block.index, prompt)
            }
        });

        let mut failed = 0;
        let prompts: Vec<VisualPrompt> = join_all(calls)
            .await
            .into_iter()
            .map(|(index, result)| {
                let prompt = result.unwrap_or_else(|_| {
                    failed += 1;
                    FALLBACK_VISUAL_PROMPT.to_string()
                });
                VisualPrompt { index, prompt }
            })
            .collect();

        let values = vec![FieldValue::VisualPrompts(prompts)];
        if failed > 0 {
            AgentOutput::fallback(values, format!("{failed} block prompt(s) fell back"))
        } else {
            AgentOutput::completed(values)
        }
    }
}

/// Designs the thumbnail concept.
pub struct ThumbnailStrategist {
    generator: Arc<dyn Generator>,
}

impl ThumbnailStrategist {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub fn fallback(topic: &str) -> Value {
        json!({ "technical_prompt": format!("Cinematic thumbnail for {topic}") })
    }
}

#[async_trait]
impl Agent for ThumbnailStrategist {
    fn name(&self) -> &'static str {
        "ThumbnailStrategist"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::ThumbnailConcept]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let topic = scope.topic();
        let hook = value_str(scope.project_bible(), &["selected_topic", "hook"]).unwrap_or("");
        let prompt = format!(
            "Design a high click-through thumbnail for \"{topic}\".\nHook: {hook}\nArt direction: {art}\n\
             Respond with JSON: {{\"concept\", \"text_overlay\", \"technical_prompt\"}}",
            art = scope.art_direction(),
        );

        let result = ask_json(self.generator.as_ref(), GenerationRequest::json(self.name(), prompt))
            .await
            .and_then(|v| {
                value_str(&v, &["technical_prompt"])
                    .filter(|p| !p.trim().is_empty())
                    .ok_or(AgentFailure::Missing("technical_prompt"))?;
                Ok(v)
            });

        match result {
            Ok(concept) => AgentOutput::completed(vec![FieldValue::ThumbnailConcept(concept)]),
            Err(e) => AgentOutput::fallback(
                vec![FieldValue::ThumbnailConcept(Self::fallback(&topic))],
                e,
            ),
        }
    }
}

/// Marks delivery notes for the narrator.
pub struct AudioDirector {
    generator: Arc<dyn Generator>,
}

impl AudioDirector {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub fn fallback() -> Value {
        json!({ "audio_notes": [], "global_notes": {} })
    }
}

#[async_trait]
impl Agent for AudioDirector {
    fn name(&self) -> &'static str {
        "AudioDirector"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::AudioInstructions]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let prompt = format!(
            "Mark up this narration for a voice actor: pace, pauses, emphasis, music cues.\n{}\n\
             Respond with JSON: {{\"audio_notes\": [{{\"block\": 0, \"notes\": \"...\"}}], \"global_notes\": {{}}}}",
            script_text(scope.final_script(), 12_000),
        );

        match ask_json(self.generator.as_ref(), GenerationRequest::json(self.name(), prompt)).await {
            Ok(notes) if notes.is_object() => {
                AgentOutput::completed(vec![FieldValue::AudioInstructions(notes)])
            }
            Ok(_) => AgentOutput::fallback(
                vec![FieldValue::AudioInstructions(Self::fallback())],
                AgentFailure::Missing("audio_notes object"),
            ),
            Err(e) => AgentOutput::fallback(vec![FieldValue::AudioInstructions(Self::fallback())], e),
        }
    }
}

/// Titles, description and tags.
pub struct SeoOptimizer {
    generator: Arc<dyn Generator>,
}

impl SeoOptimizer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub fn fallback(topic: &str, niche: &str) -> Value {
        json!({
            "titles": { "primary": topic },
            "description": { "full_description": "" },
            "tags": [niche]
        })
    }
}

#[async_trait]
impl Agent for SeoOptimizer {
    fn name(&self) -> &'static str {
        "SeoOptimizer"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::SeoPackage]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let topic = scope.topic();
        let prompt = format!(
            "Write YouTube SEO for a video about \"{topic}\" in the niche \"{niche}\".\nScript excerpt:\n{excerpt}\n\
             Respond with JSON: {{\"titles\": {{\"primary\", \"alternatives\": []}}, \
             \"description\": {{\"full_description\"}}, \"tags\": []}}",
            niche = scope.niche(),
            excerpt = script_text(scope.final_script(), 4_000),
        );

        let result = ask_json(self.generator.as_ref(), GenerationRequest::json(self.name(), prompt))
            .await
            .and_then(|v| {
                value_str(&v, &["titles", "primary"])
                    .filter(|t| !t.trim().is_empty())
                    .ok_or(AgentFailure::Missing("titles.primary"))?;
                Ok(v)
            });

        match result {
            Ok(seo) => AgentOutput::completed(vec![FieldValue::SeoPackage(seo)]),
            Err(e) => AgentOutput::fallback(
                vec![FieldValue::SeoPackage(Self::fallback(&topic, scope.niche()))],
                e,
            ),
        }
    }
}
