//! Narrative department: outline, draft, hook rewrite, punch-up pass.
//!
//! The four agents run as a strict chain; each reads the previous step's
//! output through its scope.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::agent::{ask_json, clip, list_at, Agent, AgentFailure, AgentOutput};
use crate::context::{script_text, value_str, ContextField, FieldValue, OutlineEntry, Scope, ScriptBlock};
use crate::provider::{GenerationRequest, Generator};

/// Sections used when no outline could be generated.
pub const DEFAULT_SECTIONS: [(&str, &str); 7] = [
    ("HOOK", "Open with the most shocking fact"),
    ("INTRO", "Frame the question the video answers"),
    ("PROBLEM", "Lay out the central conflict"),
    ("DEVELOPMENT", "Walk through the key events"),
    ("CLIMAX", "Reveal the turning point"),
    ("SOLUTION", "Explain the outcome and its meaning"),
    ("CTA", "Invite the viewer to keep watching"),
];

/// Designs the section outline.
pub struct ScriptArchitect {
    generator: Arc<dyn Generator>,
}

impl ScriptArchitect {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub fn fallback() -> Vec<OutlineEntry> {
        DEFAULT_SECTIONS
            .iter()
            .map(|(section, description)| OutlineEntry {
                section: section.to_string(),
                description: description.to_string(),
            })
            .collect()
    }
}

#[async_trait]
impl Agent for ScriptArchitect {
    fn name(&self) -> &'static str {
        "ScriptArchitect"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::Outline]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let prompt = format!(
            "Design the structure of a documentary script about \"{topic}\".\n\
             Project bible: {bible}\nVerified research:\n{research}\n\
             Respond with JSON: {{\"outline\": [{{\"section\": \"HOOK\", \"description\": \"...\"}}]}}",
            topic = scope.topic(),
            bible = scope.project_bible(),
            research = clip(scope.verified_research(), 10_000),
        );

        let result = ask_json(self.generator.as_ref(), GenerationRequest::json(self.name(), prompt))
            .await
            .and_then(|v| {
                list_at::<OutlineEntry>(&v, &["outline", "sections"]).ok_or(AgentFailure::Missing("outline"))
            });

        match result {
            Ok(outline) => AgentOutput::completed(vec![FieldValue::Outline(outline)]),
            Err(e) => AgentOutput::fallback(vec![FieldValue::Outline(Self::fallback())], e),
        }
    }
}

/// Writes the full first draft, one block per beat.
pub struct LeadWriter {
    generator: Arc<dyn Generator>,
}

impl LeadWriter {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// One block per outline section, narrated from its description.
    pub fn fallback(outline: &[OutlineEntry], topic: &str) -> Vec<ScriptBlock> {
        let outline = if outline.is_empty() {
            ScriptArchitect::fallback()
        } else {
            outline.to_vec()
        };
        outline
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let narration = if entry.description.trim().is_empty() {
                    format!("{} of {}", entry.section, topic)
                } else {
                    entry.description.clone()
                };
                ScriptBlock::new(i, entry.section.clone(), narration)
            })
            .collect()
    }
}

/// Re-number blocks and drop empty narration.
fn normalize(blocks: Vec<ScriptBlock>) -> Vec<ScriptBlock> {
    blocks
        .into_iter()
        .filter(|b| !b.narration.trim().is_empty())
        .enumerate()
        .map(|(i, mut b)| {
            b.index = i;
            b
        })
        .collect()
}

#[async_trait]
impl Agent for LeadWriter {
    fn name(&self) -> &'static str {
        "LeadWriter"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::RawScript]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let bible = scope.project_bible();
        let tone = value_str(bible, &["content_strategy", "tone"]).unwrap_or("Epic and revealing");
        let speak_to = value_str(scope.audience_profile(), &["messaging_guide", "speak_to"])
            .unwrap_or("A curious viewer");
        let outline = serde_json::to_string_pretty(scope.outline()).unwrap_or_default();
        let prompt = format!(
            "Write the complete narration for this outline.\nTone: {tone}\nSpeak to: {speak_to}\n\
             Outline:\n{outline}\nResearch:\n{research}\n\
             Respond with JSON: {{\"script\": [{{\"section\": \"HOOK\", \"audio_text\": \"...\"}}]}}",
            research = clip(scope.verified_research(), 10_000),
        );

        let result = ask_json(self.generator.as_ref(), GenerationRequest::json(self.name(), prompt))
            .await
            .and_then(|v| {
                list_at::<ScriptBlock>(&v, &["script", "blocks"])
                    .map(normalize)
                    .filter(|blocks| !blocks.is_empty())
                    .ok_or(AgentFailure::Missing("script"))
            });

        match result {
            Ok(blocks) => AgentOutput::completed(vec![FieldValue::RawScript(blocks)]),
            Err(e) => AgentOutput::fallback(
                vec![FieldValue::RawScript(Self::fallback(scope.outline(), &scope.topic()))],
                e,
            ),
        }
    }
}

#[derive(Deserialize)]
struct HookChoice {
    text: String,
}

/// Rewrites the opening so viewers stay past the first seconds.
pub struct HookMaster {
    generator: Arc<dyn Generator>,
}

impl HookMaster {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Agent for HookMaster {
    fn name(&self) -> &'static str {
        "HookMaster"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::HookedIntro, ContextField::RawScript]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let draft = scope.raw_script();
        let current = draft.first().map(|b| b.narration.clone()).unwrap_or_default();
        let fears = scope
            .audience_profile()
            .pointer("/psychographics/primary_fears")
            .cloned()
            .unwrap_or(Value::Null);
        let prompt = format!(
            "Rewrite this video hook so nobody scrolls away in the first 5 seconds.\n\
             Title: {title}\nAudience fears: {fears}\nCurrent hook: {current}\n\
             Respond with JSON: {{\"options\": [], \"selected_hook\": {{\"text\": \"...\", \"technique\": \"...\"}}}}",
            title = scope.topic(),
        );

        let result = ask_json(self.generator.as_ref(), GenerationRequest::json(self.name(), prompt))
            .await
            .and_then(|v| {
                v.get("selected_hook")
                    .cloned()
                    .and_then(|h| serde_json::from_value::<HookChoice>(h).ok())
                    .map(|h| h.text)
                    .filter(|t| !t.trim().is_empty())
                    .ok_or(AgentFailure::Missing("selected_hook.text"))
            });

        match result {
            Ok(hook) => {
                let mut values = vec![FieldValue::HookedIntro(hook.clone())];
                if !draft.is_empty() {
                    let mut script = draft.clone();
                    script[0].narration = hook;
                    values.push(FieldValue::RawScript(script));
                }
                AgentOutput::completed(values)
            }
            Err(e) => AgentOutput::fallback(vec![FieldValue::HookedIntro(current)], e),
        }
    }
}

/// Punch-up pass producing the final script. Block count never changes.
pub struct ComedySpecialist {
    generator: Arc<dyn Generator>,
}

impl ComedySpecialist {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Agent for ComedySpecialist {
    fn name(&self) -> &'static str {
        "ComedySpecialist"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::FinalScript]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let draft = scope.raw_script();
        let prompt = format!(
            "Add punch-ups, analogies and rhythm to this script without changing its facts or \
             its number of blocks.\n{}\n\
             Respond with JSON: {{\"enhanced_script\": [{{\"section\": \"...\", \"audio_text\": \"...\"}}]}}",
            script_text(draft, 12_000),
        );

        let result = ask_json(self.generator.as_ref(), GenerationRequest::json(self.name(), prompt))
            .await
            .and_then(|v| {
                list_at::<ScriptBlock>(&v, &["enhanced_script", "script"])
                    .ok_or(AgentFailure::Missing("enhanced_script"))
            })
            .and_then(|enhanced| {
                if enhanced.len() != draft.len() {
                    return Err(AgentFailure::Missing("one enhanced block per draft block"));
                }
                Ok(draft
                    .iter()
                    .zip(enhanced)
                    .map(|(original, better)| {
                        let narration = if better.narration.trim().is_empty() {
                            original.narration.clone()
                        } else {
                            better.narration
                        };
                        ScriptBlock::new(original.index, original.section.clone(), narration)
                    })
                    .collect::<Vec<_>>())
            });

        match result {
            Ok(script) => AgentOutput::completed(vec![FieldValue::FinalScript(script)]),
            Err(e) => AgentOutput::fallback(vec![FieldValue::FinalScript(draft.clone())], e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_writer_fallback_follows_outline() {
        let outline = vec![
            OutlineEntry {
                section: "HOOK".into(),
                description: "Open strong".into(),
            },
            OutlineEntry {
                section: "CTA".into(),
                description: String::new(),
            },
        ];
        let blocks = LeadWriter::fallback(&outline, "Rome");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].narration, "Open strong");
        assert_eq!(blocks[1].narration, "CTA of Rome");
        assert_eq!(blocks[1].index, 1);
    }

    #[test]
    fn lead_writer_fallback_without_outline_uses_default_sections() {
        let blocks = LeadWriter::fallback(&[], "Rome");
        assert_eq!(blocks.len(), DEFAULT_SECTIONS.len());
    }

    #[test]
    fn normalize_reindexes_and_drops_blank_blocks() {
        let blocks = normalize(vec![
            ScriptBlock::new(9, "A", "one"),
            ScriptBlock::new(9, "B", "  "),
            ScriptBlock::new(9, "C", "three"),
        ]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].index, 1);
        assert_eq!(blocks[1].section, "C");
    }
}
