//! Text editing capability and the refine-pass agent built on it.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use reel_store::AuditReport;
use serde_json::Value;

use crate::agent::{ask_text, Agent, AgentFailure, AgentOutput};
use crate::agents::assets::visual_prompt_request;
use crate::context::{ContextField, FieldValue, Scope, ScriptBlock};
use crate::provider::{GenerationRequest, Generator};

/// Critique used when an audit produced no issues.
pub const DEFAULT_CRITIQUE: &str = "Tighten the pacing and sharpen every sentence.";

/// Rewrites narration on request.
#[derive(Clone)]
pub struct Editor {
    generator: Arc<dyn Generator>,
}

impl Editor {
    pub const NAME: &'static str = "Editor";

    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Rewrite `text` addressing `critique`.
    pub async fn refine_text(&self, text: &str, critique: &str) -> Result<String, AgentFailure> {
        let prompt = format!(
            "Rewrite this narration addressing the critique. Keep facts, length and tone.\n\
             Critique:\n{critique}\n\nNarration:\n{text}\n\nReply with the rewritten narration only."
        );
        ask_text(self.generator.as_ref(), GenerationRequest::text(Self::NAME, prompt)).await
    }

    /// Grow `text` with more detail drawn from `context`.
    pub async fn expand_text(&self, text: &str, context: &str) -> Result<String, AgentFailure> {
        let prompt = format!(
            "Expand this narration to roughly twice its length with concrete detail.\n\
             Context: {context}\n\nNarration:\n{text}\n\nReply with the expanded narration only."
        );
        ask_text(self.generator.as_ref(), GenerationRequest::text(Self::NAME, prompt)).await
    }

    /// Cut `text` to about half its length.
    pub async fn shorten_text(&self, text: &str) -> Result<String, AgentFailure> {
        let prompt = format!(
            "Shorten this narration to about half its length without losing the key fact.\n\n\
             Narration:\n{text}\n\nReply with the shortened narration only."
        );
        ask_text(self.generator.as_ref(), GenerationRequest::text(Self::NAME, prompt)).await
    }

    /// Write a fresh image prompt for one block.
    pub async fn regenerate_visual_prompt(
        &self,
        block: &ScriptBlock,
        art_direction: &Value,
    ) -> Result<String, AgentFailure> {
        let request = visual_prompt_request(Self::NAME, art_direction, &block.section, &block.narration);
        ask_text(self.generator.as_ref(), request).await
    }

    /// Refine every block with `critique`. Failed blocks keep their text.
    ///
    /// Returns the new blocks and the number that fell back.
    pub async fn refine_blocks(&self, blocks: &[ScriptBlock], critique: &str) -> (Vec<ScriptBlock>, usize) {
        let calls = blocks.iter().map(|block| async move {
            match self.refine_text(&block.narration, critique).await {
                Ok(text) => (ScriptBlock::new(block.index, block.section.clone(), text), false),
                Err(e) => {
                    tracing::warn!(index = block.index, error = %e, "block refinement failed");
                    (block.clone(), true)
                }
            }
        });

        let mut failed = 0;
        let refined = join_all(calls)
            .await
            .into_iter()
            .map(|(block, fell_back)| {
                if fell_back {
                    failed += 1;
                }
                block
            })
            .collect();
        (refined, failed)
    }
}

/// Critique built from the report's top issues, one per line.
pub fn critique_from_issues(report: Option<&AuditReport>) -> Option<String> {
    let report = report?;
    if report.top_issues.is_empty() {
        return None;
    }
    Some(
        report
            .top_issues
            .iter()
            .map(|i| format!("- [{}] {}", i.auditor, i.issue))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

/// Verdict plus the first issue of every auditor that raised one.
pub fn critique_from_panel(report: &AuditReport) -> Option<String> {
    let lines: Vec<String> = report
        .auditors
        .iter()
        .filter_map(|a| a.top_issues.first().map(|issue| format!("- [{}] {}", a.auditor, issue)))
        .collect();
    if lines.is_empty() {
        return None;
    }
    Some(format!(
        "Panel verdict: {} ({:.1}/10)\n{}",
        report.global_verdict,
        report.global_score,
        lines.join("\n")
    ))
}

/// Refine node body: rewrites the final script against the latest audit.
pub struct ScriptRefiner {
    editor: Editor,
}

impl ScriptRefiner {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            editor: Editor::new(generator),
        }
    }
}

#[async_trait]
impl Agent for ScriptRefiner {
    fn name(&self) -> &'static str {
        "ScriptRefiner"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::FinalScript]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let critique = critique_from_issues(scope.audit_report().as_ref())
            .unwrap_or_else(|| DEFAULT_CRITIQUE.to_string());
        let (blocks, failed) = self.editor.refine_blocks(scope.final_script(), &critique).await;

        let values = vec![FieldValue::FinalScript(blocks)];
        if failed > 0 {
            AgentOutput::fallback(values, format!("{failed} block(s) kept their previous text"))
        } else {
            AgentOutput::completed(values)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_store::{AuditorReport, TaggedIssue, Verdict};

    fn report() -> AuditReport {
        AuditReport {
            global_score: 5.5,
            global_verdict: Verdict::NeedsReview,
            top_issues: vec![TaggedIssue {
                auditor: "Content Editor".into(),
                issue: "Too long".into(),
            }],
            quick_wins: vec![],
            auditors: vec![
                AuditorReport {
                    auditor: "Content Editor".into(),
                    icon: "✍️".into(),
                    score: 5.5,
                    verdict: "weak".into(),
                    top_issues: vec!["Too long".into(), "Repetitive".into()],
                    quick_wins: vec![],
                    error: None,
                },
                AuditorReport::failed("Visual Director", "🎨", "timeout"),
            ],
        }
    }

    #[test]
    fn issues_critique_lists_tagged_issues() {
        let critique = critique_from_issues(Some(&report())).unwrap();
        assert_eq!(critique, "- [Content Editor] Too long");
        assert!(critique_from_issues(None).is_none());
    }

    #[test]
    fn panel_critique_skips_failed_auditors() {
        let critique = critique_from_panel(&report()).unwrap();
        assert!(critique.starts_with("Panel verdict: needs-review (5.5/10)"));
        assert!(critique.contains("[Content Editor] Too long"));
        assert!(!critique.contains("Visual Director"));
        assert!(!critique.contains("Repetitive"));
    }
}
