//! Strategy department: trends, audience, competitors, project bible.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent::{ask_json, Agent, AgentFailure, AgentOutput};
use crate::context::{value_str, ContextField, FieldValue, Scope};
use crate::provider::{GenerationRequest, Generator};

/// Finds trending angles inside the niche.
pub struct TrendHunter {
    generator: Arc<dyn Generator>,
}

impl TrendHunter {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub fn fallback(niche: &str) -> Value {
        json!([{
            "topic": niche,
            "angle": "The untold story",
            "traffic_potential": 7
        }])
    }
}

#[async_trait]
impl Agent for TrendHunter {
    fn name(&self) -> &'static str {
        "TrendHunter"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::Trends]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let prompt = format!(
            "You are a YouTube trend analyst. List the five most promising video \
             opportunities in the niche \"{}\". Respond with JSON: \
             {{\"opportunities\": [{{\"topic\", \"angle\", \"traffic_potential\" (1-10), \"why_now\"}}]}}",
            scope.niche()
        );

        let result = ask_json(self.generator.as_ref(), GenerationRequest::json(self.name(), prompt))
            .await
            .and_then(|value| {
                let list = if value.is_array() {
                    value
                } else {
                    value
                        .get("opportunities")
                        .or_else(|| value.get("trends"))
                        .cloned()
                        .ok_or(AgentFailure::Missing("opportunities"))?
                };
                match list.as_array() {
                    Some(items) if !items.is_empty() => Ok(list),
                    _ => Err(AgentFailure::Missing("opportunities")),
                }
            });

        match result {
            Ok(trends) => AgentOutput::completed(vec![FieldValue::Trends(trends)]),
            Err(e) => AgentOutput::fallback(
                vec![FieldValue::Trends(Self::fallback(scope.niche()))],
                e,
            ),
        }
    }
}

/// Builds the psychographic profile of the target viewer.
pub struct AudienceProfiler {
    generator: Arc<dyn Generator>,
}

impl AudienceProfiler {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub fn fallback() -> Value {
        json!({
            "psychographics": { "primary_fears": [], "deep_desires": [] }
        })
    }
}

#[async_trait]
impl Agent for AudienceProfiler {
    fn name(&self) -> &'static str {
        "AudienceProfiler"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::AudienceProfile]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let prompt = format!(
            "Profile the typical viewer of long-form videos about \"{}\". Respond with JSON: \
             {{\"demographics\": {{}}, \"psychographics\": {{\"primary_fears\": [], \"deep_desires\": []}}, \
             \"messaging_guide\": {{\"speak_to\": \"\", \"avoid\": []}}}}",
            scope.niche()
        );

        match ask_json(self.generator.as_ref(), GenerationRequest::json(self.name(), prompt)).await {
            Ok(profile) if profile.is_object() => {
                AgentOutput::completed(vec![FieldValue::AudienceProfile(profile)])
            }
            Ok(_) => AgentOutput::fallback(
                vec![FieldValue::AudienceProfile(Self::fallback())],
                AgentFailure::Missing("profile object"),
            ),
            Err(e) => AgentOutput::fallback(vec![FieldValue::AudienceProfile(Self::fallback())], e),
        }
    }
}

/// Maps saturated angles and open gaps among existing channels.
pub struct CompetitorAnalyst {
    generator: Arc<dyn Generator>,
}

impl CompetitorAnalyst {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub fn fallback() -> Value {
        json!({ "saturated_angles": [], "content_gaps": [] })
    }
}

#[async_trait]
impl Agent for CompetitorAnalyst {
    fn name(&self) -> &'static str {
        "CompetitorAnalyst"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::CompetitorAnalysis]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let prompt = format!(
            "Analyse the leading channels covering \"{}\". Respond with JSON: \
             {{\"saturated_angles\": [], \"content_gaps\": [], \"winning_formats\": []}}",
            scope.niche()
        );

        match ask_json(self.generator.as_ref(), GenerationRequest::json(self.name(), prompt)).await {
            Ok(analysis) if analysis.is_object() => {
                AgentOutput::completed(vec![FieldValue::CompetitorAnalysis(analysis)])
            }
            Ok(_) => AgentOutput::fallback(
                vec![FieldValue::CompetitorAnalysis(Self::fallback())],
                AgentFailure::Missing("analysis object"),
            ),
            Err(e) => {
                AgentOutput::fallback(vec![FieldValue::CompetitorAnalysis(Self::fallback())], e)
            }
        }
    }
}

/// Picks the topic and writes the project bible everyone else follows.
pub struct ProjectManager {
    generator: Arc<dyn Generator>,
}

impl ProjectManager {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub fn fallback(niche: &str) -> Value {
        json!({
            "selected_topic": {
                "title": niche,
                "angle": "Documentary deep dive",
                "hook": format!("What nobody tells you about {niche}")
            }
        })
    }
}

#[async_trait]
impl Agent for ProjectManager {
    fn name(&self) -> &'static str {
        "ProjectManager"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::ProjectBible]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let prompt = format!(
            "You are the executive producer of a documentary YouTube channel.\n\
             Niche: {niche}\nTrends: {trends}\nAudience: {audience}\nCompetition: {competition}\n\
             Choose ONE topic and define the project bible. Respond with JSON: \
             {{\"selected_topic\": {{\"title\", \"angle\", \"hook\"}}, \
             \"content_strategy\": {{\"tone\", \"target_duration_minutes\"}}}}",
            niche = scope.niche(),
            trends = scope.trends(),
            audience = scope.audience_profile(),
            competition = scope.competitor_analysis(),
        );

        let result = ask_json(self.generator.as_ref(), GenerationRequest::json(self.name(), prompt))
            .await
            .and_then(|bible| {
                value_str(&bible, &["selected_topic", "title"])
                    .filter(|t| !t.trim().is_empty())
                    .ok_or(AgentFailure::Missing("selected_topic.title"))?;
                Ok(bible)
            });

        match result {
            Ok(bible) => AgentOutput::completed(vec![FieldValue::ProjectBible(bible)]),
            Err(e) => AgentOutput::fallback(
                vec![FieldValue::ProjectBible(Self::fallback(scope.niche()))],
                e,
            ),
        }
    }
}
