//! Media rendering: block images, thumbnail, narration.
//!
//! Items are generated one at a time. A failed item leaves `None` at its
//! position and the loop continues.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::agent::{Agent, AgentOutput};
use crate::context::{value_str, ContextField, FieldValue, Scope};
use crate::provider::MediaSynthesizer;

fn summarize(values: Vec<FieldValue>, failed: usize, what: &str) -> AgentOutput {
    if failed == 0 {
        AgentOutput::completed(values)
    } else {
        AgentOutput::fallback(values, format!("{failed} {what} failed"))
    }
}

/// One image per visual prompt, index-aligned.
pub struct ImageRenderer {
    media: Arc<dyn MediaSynthesizer>,
}

impl ImageRenderer {
    pub fn new(media: Arc<dyn MediaSynthesizer>) -> Self {
        Self { media }
    }
}

#[async_trait]
impl Agent for ImageRenderer {
    fn name(&self) -> &'static str {
        "ImageRenderer"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::GeneratedImages]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let mut images = Vec::with_capacity(scope.visual_prompts().len());
        let mut failed = 0;

        for (position, prompt) in scope.visual_prompts().iter().enumerate() {
            let suffix = format!("img_{position}");
            match self
                .media
                .render_image(&prompt.prompt, scope.project_id(), &suffix)
                .await
            {
                Ok(file) => images.push(Some(file)),
                Err(e) => {
                    warn!(index = position, error = %e, "image render failed");
                    failed += 1;
                    images.push(None);
                }
            }
        }

        summarize(vec![FieldValue::GeneratedImages(images)], failed, "image(s)")
    }
}

/// Thumbnail image, when a concept prompt exists.
pub struct ThumbnailRenderer {
    media: Arc<dyn MediaSynthesizer>,
}

impl ThumbnailRenderer {
    pub fn new(media: Arc<dyn MediaSynthesizer>) -> Self {
        Self { media }
    }
}

#[async_trait]
impl Agent for ThumbnailRenderer {
    fn name(&self) -> &'static str {
        "ThumbnailRenderer"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::ThumbnailFile]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let Some(prompt) = value_str(scope.thumbnail_concept(), &["technical_prompt"])
            .filter(|p| !p.trim().is_empty())
        else {
            return AgentOutput::completed(vec![FieldValue::ThumbnailFile(None)]);
        };

        match self
            .media
            .render_image(prompt, scope.project_id(), "thumbnail")
            .await
        {
            Ok(file) => AgentOutput::completed(vec![FieldValue::ThumbnailFile(Some(file))]),
            Err(e) => {
                warn!(error = %e, "thumbnail render failed");
                AgentOutput::fallback(vec![FieldValue::ThumbnailFile(None)], e)
            }
        }
    }
}

/// One narration clip per final-script block, index-aligned.
pub struct Narrator {
    media: Arc<dyn MediaSynthesizer>,
}

impl Narrator {
    pub fn new(media: Arc<dyn MediaSynthesizer>) -> Self {
        Self { media }
    }
}

#[async_trait]
impl Agent for Narrator {
    fn name(&self) -> &'static str {
        "Narrator"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::GeneratedAudio]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let mut clips = Vec::with_capacity(scope.final_script().len());
        let mut failed = 0;

        for (position, block) in scope.final_script().iter().enumerate() {
            if block.narration.trim().is_empty() {
                clips.push(None);
                continue;
            }
            match self
                .media
                .synthesize_speech(&block.narration, scope.project_id(), position)
                .await
            {
                Ok(clip) => clips.push(Some(clip)),
                Err(e) => {
                    warn!(index = position, error = %e, "narration failed");
                    failed += 1;
                    clips.push(None);
                }
            }
        }

        summarize(vec![FieldValue::GeneratedAudio(clips)], failed, "narration clip(s)")
    }
}
