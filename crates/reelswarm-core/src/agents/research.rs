//! Research department: deep research, human-interest stories, fact check.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::{ask_text, clip, Agent, AgentOutput};
use crate::context::{value_str, ContextField, FieldValue, Scope};
use crate::provider::{GenerationRequest, Generator};

/// Grounded long-form research on the selected topic.
pub struct DeepResearcher {
    generator: Arc<dyn Generator>,
}

impl DeepResearcher {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub fn fallback(topic: &str) -> String {
        format!("Research on {topic}")
    }
}

#[async_trait]
impl Agent for DeepResearcher {
    fn name(&self) -> &'static str {
        "DeepResearcher"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::DeepResearch]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let topic = scope.topic();
        let angle = value_str(scope.project_bible(), &["selected_topic", "angle"]).unwrap_or("");
        let prompt = format!(
            "Research \"{topic}\" in depth (angle: {angle}). Cover key facts, dates, figures, \
             causes and consequences, little-known details, and cite sources inline."
        );
        let request = GenerationRequest::text(self.name(), prompt)
            .research()
            .grounded();

        match ask_text(self.generator.as_ref(), request).await {
            Ok(text) => AgentOutput::completed(vec![FieldValue::DeepResearch(text)]),
            Err(e) => AgentOutput::fallback(
                vec![FieldValue::DeepResearch(Self::fallback(&topic))],
                e,
            ),
        }
    }
}

/// Finds the people behind the topic.
pub struct InvestigativeJournalist {
    generator: Arc<dyn Generator>,
}

impl InvestigativeJournalist {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub fn fallback(topic: &str) -> String {
        format!("No human-interest stories were found for {topic}.")
    }
}

#[async_trait]
impl Agent for InvestigativeJournalist {
    fn name(&self) -> &'static str {
        "InvestigativeJournalist"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::HumanStories]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let topic = scope.topic();
        let prompt = format!(
            "Find three real human stories connected to \"{topic}\": named people, what they \
             faced, what they chose, and what it cost them. Plain prose."
        );

        match ask_text(self.generator.as_ref(), GenerationRequest::text(self.name(), prompt)).await {
            Ok(text) => AgentOutput::completed(vec![FieldValue::HumanStories(text)]),
            Err(e) => AgentOutput::fallback(
                vec![FieldValue::HumanStories(Self::fallback(&topic))],
                e,
            ),
        }
    }
}

/// Merges both research streams and strips unsupported claims.
pub struct FactChecker {
    generator: Arc<dyn Generator>,
}

impl FactChecker {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub fn fallback(deep: &str, human: &str) -> String {
        format!("{deep}\n\n{human}")
    }
}

#[async_trait]
impl Agent for FactChecker {
    fn name(&self) -> &'static str {
        "FactChecker"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::VerifiedResearch]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let deep = scope.deep_research();
        let human = scope.human_stories();
        let prompt = format!(
            "Fact-check and merge the research below into one verified brief. Remove or flag \
             anything doubtful.\n\n## Research\n{}\n\n## Human stories\n{}",
            clip(deep, 15_000),
            clip(human, 5_000),
        );

        match ask_text(self.generator.as_ref(), GenerationRequest::text(self.name(), prompt)).await {
            Ok(text) => AgentOutput::completed(vec![FieldValue::VerifiedResearch(text)]),
            Err(e) => AgentOutput::fallback(
                vec![FieldValue::VerifiedResearch(Self::fallback(deep, human))],
                e,
            ),
        }
    }
}
