//! Shared pipeline state.
//!
//! A [`Context`] is created per run with only `project_id` and `niche`
//! populated. Every other field is owned by exactly one stage. Agents never
//! mutate the context directly: they return [`FieldValue`]s which the phase
//! runner applies after the agent (or its parallel group) completes.
//!
//! A [`Scope`] is the read view an agent gets. It layers values staged by
//! earlier steps of the same sequential chain over the base context, so a
//! chain running inside a parallel group sees its own outputs without the
//! context being copied or locked.

use reel_store::{AuditReport, ProjectRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One segment of the video script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptBlock {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub section: String,
    #[serde(alias = "audio_text", alias = "text")]
    pub narration: String,
}

impl ScriptBlock {
    pub fn new(index: usize, section: impl Into<String>, narration: impl Into<String>) -> Self {
        Self {
            index,
            section: section.into(),
            narration: narration.into(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.narration.split_whitespace().count()
    }
}

/// One section of the narrative outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub section: String,
    #[serde(default, alias = "content", alias = "objective")]
    pub description: String,
}

/// Image prompt for the script block at `index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualPrompt {
    pub index: usize,
    pub prompt: String,
}

/// A synthesized narration clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechClip {
    pub file: String,
    pub duration_seconds: f64,
}

macro_rules! context_fields {
    ($( $(#[$meta:meta])* $field:ident : $ty:ty => $variant:ident ),* $(,)?) => {
        /// Shared mutable record threaded through every node of a run.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct Context {
            pub project_id: String,
            pub niche: String,
            $( $(#[$meta])* #[serde(default)] pub $field: $ty, )*
        }

        /// Names of the stage-owned fields of [`Context`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ContextField {
            $( $variant, )*
        }

        impl ContextField {
            pub const ALL: &'static [ContextField] = &[$( ContextField::$variant, )*];

            pub fn name(self) -> &'static str {
                match self {
                    $( ContextField::$variant => stringify!($field), )*
                }
            }
        }

        /// A value destined for one stage-owned field.
        #[derive(Debug, Clone, PartialEq)]
        pub enum FieldValue {
            $( $variant($ty), )*
        }

        impl FieldValue {
            pub fn field(&self) -> ContextField {
                match self {
                    $( FieldValue::$variant(_) => ContextField::$variant, )*
                }
            }
        }

        impl Context {
            /// Replace the field addressed by `value`.
            pub fn apply(&mut self, value: FieldValue) {
                match value {
                    $( FieldValue::$variant(v) => self.$field = v, )*
                }
            }
        }

        impl<'a> Scope<'a> {
            $(
                pub fn $field(&self) -> &'a $ty {
                    let staged: &'a [FieldValue] = self.staged;
                    for value in staged.iter().rev() {
                        if let FieldValue::$variant(v) = value {
                            return v;
                        }
                    }
                    let base: &'a Context = self.base;
                    &base.$field
                }
            )*
        }
    };
}

context_fields! {
    // strategy
    trends: Value => Trends,
    audience_profile: Value => AudienceProfile,
    competitor_analysis: Value => CompetitorAnalysis,
    project_bible: Value => ProjectBible,
    // research
    deep_research: String => DeepResearch,
    human_stories: String => HumanStories,
    verified_research: String => VerifiedResearch,
    // narrative
    outline: Vec<OutlineEntry> => Outline,
    raw_script: Vec<ScriptBlock> => RawScript,
    hooked_intro: String => HookedIntro,
    final_script: Vec<ScriptBlock> => FinalScript,
    // assets
    art_direction: Value => ArtDirection,
    visual_prompts: Vec<VisualPrompt> => VisualPrompts,
    thumbnail_concept: Value => ThumbnailConcept,
    audio_instructions: Value => AudioInstructions,
    seo_package: Value => SeoPackage,
    // media, index-aligned with `visual_prompts` and `final_script`
    generated_images: Vec<Option<String>> => GeneratedImages,
    thumbnail_file: Option<String> => ThumbnailFile,
    generated_audio: Vec<Option<SpeechClip>> => GeneratedAudio,
    // quality
    audit_report: Option<AuditReport> => AuditReport,
}

impl std::fmt::Display for ContextField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Context {
    pub fn new(project_id: impl Into<String>, niche: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            niche: niche.into(),
            ..Default::default()
        }
    }

    /// Read view over this context with nothing staged.
    pub fn scope(&self) -> Scope<'_> {
        Scope::new(self, &[])
    }

    /// Selected topic title, or the niche when strategy produced none.
    pub fn topic(&self) -> String {
        self.scope().topic()
    }

    /// Rebuild the state a stored project was compiled from.
    pub fn from_record(record: &ProjectRecord) -> Self {
        let mut ctx = Context::new(&record.id, &record.niche);
        ctx.trends = record.trends.clone();
        ctx.audience_profile = record.audience_profile.clone();
        ctx.competitor_analysis = record.competitor_analysis.clone();
        ctx.project_bible = record.project_bible.clone();
        ctx.verified_research = record.verified_research.clone();
        ctx.outline = serde_json::from_value(record.outline.clone()).unwrap_or_default();
        ctx.art_direction = record.art_direction.clone();
        ctx.audio_instructions = record.audio_instructions.clone();
        ctx.seo_package = record.seo_package.clone();
        ctx.audit_report = record.audit_report.clone();
        ctx.thumbnail_file = record.metadata.thumbnail_file.clone();
        if let Some(prompt) = &record.metadata.thumbnail_prompt {
            ctx.thumbnail_concept = serde_json::json!({ "technical_prompt": prompt });
        }

        for block in &record.script {
            ctx.final_script.push(ScriptBlock::new(
                block.index,
                block.section.clone(),
                block.narration.clone(),
            ));
            ctx.visual_prompts.push(VisualPrompt {
                index: block.index,
                prompt: block.visual_prompt.clone().unwrap_or_default(),
            });
            ctx.generated_images.push(block.image_file.clone());
            ctx.generated_audio
                .push(block.audio_file.clone().map(|file| SpeechClip {
                    file,
                    duration_seconds: block.duration_seconds,
                }));
        }
        ctx
    }
}

/// Read view handed to an agent.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    base: &'a Context,
    staged: &'a [FieldValue],
}

impl<'a> Scope<'a> {
    pub fn new(base: &'a Context, staged: &'a [FieldValue]) -> Self {
        Self { base, staged }
    }

    pub fn project_id(&self) -> &str {
        &self.base.project_id
    }

    pub fn niche(&self) -> &str {
        &self.base.niche
    }

    pub fn topic(&self) -> String {
        value_str(self.project_bible(), &["selected_topic", "title"])
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(self.niche())
            .to_string()
    }
}

/// Walk `path` through nested objects and return the string found there.
pub fn value_str<'v>(value: &'v Value, path: &[&str]) -> Option<&'v str> {
    path.iter()
        .try_fold(value, |v, key| v.get(key))
        .and_then(Value::as_str)
}

/// Render script blocks as `[SECTION] narration` lines.
pub fn script_text(blocks: &[ScriptBlock], max_chars: usize) -> String {
    let text = blocks
        .iter()
        .map(|b| format!("[{}] {}", b.section, b.narration))
        .collect::<Vec<_>>()
        .join("\n");
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn apply_replaces_field() {
        let mut ctx = Context::new("proj_1", "History");
        ctx.apply(FieldValue::HookedIntro("Hook".to_string()));
        ctx.apply(FieldValue::HookedIntro("Better hook".to_string()));
        assert_eq!(ctx.hooked_intro, "Better hook");
        assert_eq!(
            FieldValue::HookedIntro(String::new()).field(),
            ContextField::HookedIntro
        );
    }

    #[test]
    fn scope_prefers_latest_staged_value() {
        let mut ctx = Context::new("proj_1", "History");
        ctx.deep_research = "base".to_string();
        let staged = vec![
            FieldValue::DeepResearch("first".to_string()),
            FieldValue::DeepResearch("second".to_string()),
        ];
        let scope = Scope::new(&ctx, &staged);
        assert_eq!(scope.deep_research(), "second");
        assert_eq!(ctx.scope().deep_research(), "base");
    }

    #[test]
    fn topic_falls_back_to_niche() {
        let mut ctx = Context::new("proj_1", "Ancient Rome");
        assert_eq!(ctx.topic(), "Ancient Rome");

        ctx.project_bible = json!({"selected_topic": {"title": "The Fall of Rome"}});
        assert_eq!(ctx.topic(), "The Fall of Rome");

        ctx.project_bible = json!({"selected_topic": {"title": "  "}});
        assert_eq!(ctx.topic(), "Ancient Rome");
    }

    #[test]
    fn script_block_accepts_audio_text_alias() {
        let block: ScriptBlock =
            serde_json::from_value(json!({"section": "HOOK", "audio_text": "Listen."})).unwrap();
        assert_eq!(block.narration, "Listen.");
        assert_eq!(block.word_count(), 1);
    }

    #[test]
    fn script_text_truncates_on_char_boundary() {
        let blocks = vec![ScriptBlock::new(0, "HOOK", "ñandú ñandú")];
        let text = script_text(&blocks, 9);
        assert_eq!(text.chars().count(), 9);
        assert!(text.starts_with("[HOOK]"));
    }

    #[test]
    fn field_names_are_unique() {
        let mut names: Vec<_> = ContextField::ALL.iter().map(|f| f.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ContextField::ALL.len());
    }
}
