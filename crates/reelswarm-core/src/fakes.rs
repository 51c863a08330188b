//! In-process stand-ins for the generation service, media synthesis and the
//! notification channel. Used by the integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::audit::default_panel;
use crate::context::SpeechClip;
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::provider::{GenerationRequest, Generator, MediaSynthesizer, ProviderError};

type Responder = Arc<dyn Fn(&GenerationRequest, usize) -> Result<String, ProviderError> + Send + Sync>;

/// Number of blocks in the script produced by [`ScriptedGenerator::happy`].
pub const HAPPY_BLOCKS: usize = 3;

/// Generator answering per agent label from scripted responders.
///
/// A responder gets the request and the zero-based call count for that
/// label. Labels without a responder fail with a provider error.
#[derive(Default)]
pub struct ScriptedGenerator {
    responders: HashMap<String, Responder>,
    delays: HashMap<String, Duration>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Valid replies for every standard agent; every auditor scores 8.
    pub fn happy() -> Self {
        let script = json!({"script": [
            {"section": "HOOK", "audio_text": "Rome did not fall in a day."},
            {"section": "DEVELOPMENT", "audio_text": "It took centuries of slow decay."},
            {"section": "CTA", "audio_text": "Subscribe for the next empire."}
        ]});
        let enhanced = json!({"enhanced_script": [
            {"section": "HOOK", "audio_text": "Rome did not fall in a day. It fell in a thousand."},
            {"section": "DEVELOPMENT", "audio_text": "Centuries of slow, stubborn decay."},
            {"section": "CTA", "audio_text": "Subscribe before the next empire falls."}
        ]});

        Self::new()
            .reply("TrendHunter", json!({"opportunities": [{"topic": "Fall of Rome", "angle": "Decay", "traffic_potential": 9}]}).to_string())
            .reply("AudienceProfiler", json!({"psychographics": {"primary_fears": ["collapse"], "deep_desires": ["meaning"]}, "messaging_guide": {"speak_to": "History fans"}}).to_string())
            .reply("CompetitorAnalyst", json!({"saturated_angles": ["battles"], "content_gaps": ["economics"]}).to_string())
            .reply("ProjectManager", json!({"selected_topic": {"title": "The Fall of Rome", "angle": "Slow decay", "hook": "Empires die quietly"}, "content_strategy": {"tone": "Epic"}}).to_string())
            .reply("DeepResearcher", "Rome declined over three centuries.")
            .reply("InvestigativeJournalist", "Romulus Augustulus was sixteen when he was deposed.")
            .reply("FactChecker", "Verified: Rome declined over three centuries.")
            .reply("ScriptArchitect", json!({"outline": [
                {"section": "HOOK", "description": "Open"},
                {"section": "DEVELOPMENT", "description": "Explain"},
                {"section": "CTA", "description": "Close"}
            ]}).to_string())
            .reply("LeadWriter", script.to_string())
            .reply("HookMaster", json!({"selected_hook": {"text": "Rome did not fall in a day.", "technique": "paradox"}}).to_string())
            .reply("ComedySpecialist", enhanced.to_string())
            .reply("Editor", "A sharper line of narration.")
            .reply("ArtDirector", json!({"visual_style": {"aesthetic": "Oil painting"}}).to_string())
            .reply("PromptEngineer", "Marble ruins at dusk, oil painting")
            .reply("ThumbnailStrategist", json!({"concept": "Crumbling column", "technical_prompt": "A cracked marble column"}).to_string())
            .reply("AudioDirector", json!({"audio_notes": [{"block": 0, "notes": "slow"}], "global_notes": {}}).to_string())
            .reply("SeoOptimizer", json!({"titles": {"primary": "Why Rome Really Fell"}, "description": {"full_description": "The slow decay of an empire."}, "tags": ["rome", "history"]}).to_string())
            .audit_scores(&[8.0])
    }

    /// Answer `agent` with `f(request, call_index)`.
    pub fn respond<F>(mut self, agent: &str, f: F) -> Self
    where
        F: Fn(&GenerationRequest, usize) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        self.responders.insert(agent.to_string(), Arc::new(f));
        self
    }

    /// Always answer `agent` with `text`.
    pub fn reply(self, agent: &str, text: impl Into<String>) -> Self {
        let text = text.into();
        self.respond(agent, move |_, _| Ok(text.clone()))
    }

    /// Answer `agent` with `replies` in order, repeating the last one.
    pub fn replies(self, agent: &str, replies: Vec<String>) -> Self {
        self.respond(agent, move |_, n| {
            replies
                .get(n.min(replies.len().saturating_sub(1)))
                .cloned()
                .ok_or_else(|| ProviderError::Failed("no replies scripted".to_string()))
        })
    }

    /// Every call from `agent` fails.
    pub fn fail(self, agent: &str) -> Self {
        let label = agent.to_string();
        self.respond(agent, move |_, _| {
            Err(ProviderError::Failed(format!("{label} is unavailable")))
        })
    }

    /// Delay every reply to `agent`.
    pub fn delay(mut self, agent: &str, delay: Duration) -> Self {
        self.delays.insert(agent.to_string(), delay);
        self
    }

    /// Every default auditor scores `scores[n]` on its n-th audit, repeating
    /// the last score.
    pub fn audit_scores(mut self, scores: &[f64]) -> Self {
        for spec in default_panel() {
            let replies = scores
                .iter()
                .map(|score| {
                    json!({
                        "score": score,
                        "verdict": "scripted",
                        "top_issues": [format!("{} issue at {score}", spec.name)],
                        "quick_wins": ["Shorter sentences"]
                    })
                    .to_string()
                })
                .collect();
            self = self.replies(&spec.name, replies);
        }
        self
    }

    /// Calls made with `agent` as the label.
    pub fn calls(&self, agent: &str) -> usize {
        self.calls.lock().unwrap().get(agent).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn invoke(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(request.agent.clone()).or_insert(0);
            *count += 1;
            *count - 1
        };
        if let Some(delay) = self.delays.get(&request.agent) {
            tokio::time::sleep(*delay).await;
        }
        match self.responders.get(&request.agent) {
            Some(responder) => responder(request, n),
            None => Err(ProviderError::Failed(format!(
                "no scripted reply for {}",
                request.agent
            ))),
        }
    }
}

/// Media synthesizer that writes nothing and names files predictably.
#[derive(Default)]
pub struct StubMedia {
    failing_images: HashSet<String>,
    failing_speech: HashSet<usize>,
    images: Mutex<Vec<String>>,
    clips: Mutex<Vec<String>>,
}

impl StubMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail image renders with this suffix (`img_1`, `thumbnail`).
    pub fn failing_image(mut self, suffix: &str) -> Self {
        self.failing_images.insert(suffix.to_string());
        self
    }

    /// Fail speech for the block at this position.
    pub fn failing_speech(mut self, index: usize) -> Self {
        self.failing_speech.insert(index);
        self
    }

    pub fn images(&self) -> Vec<String> {
        self.images.lock().unwrap().clone()
    }

    pub fn clips(&self) -> Vec<String> {
        self.clips.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaSynthesizer for StubMedia {
    async fn render_image(
        &self,
        _prompt: &str,
        project_id: &str,
        suffix: &str,
    ) -> Result<String, ProviderError> {
        if self.failing_images.contains(suffix) {
            return Err(ProviderError::Failed(format!("image {suffix} failed")));
        }
        let file = format!("{project_id}_{suffix}.png");
        self.images.lock().unwrap().push(file.clone());
        Ok(file)
    }

    async fn synthesize_speech(
        &self,
        text: &str,
        project_id: &str,
        index: usize,
    ) -> Result<SpeechClip, ProviderError> {
        if self.failing_speech.contains(&index) {
            return Err(ProviderError::Failed(format!("speech {index} failed")));
        }
        let file = format!("{project_id}_{index}.wav");
        self.clips.lock().unwrap().push(file.clone());
        Ok(SpeechClip {
            file,
            duration_seconds: text.split_whitespace().count() as f64 * 0.5,
        })
    }
}

/// Sink that keeps every notification.
#[derive(Default)]
pub struct MemorySink {
    notifications: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn messages(&self, kind: NotificationKind) -> Vec<String> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.kind == kind)
            .map(|n| n.message.clone())
            .collect()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.messages(kind).len()
    }
}

impl NotificationSink for MemorySink {
    fn emit(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}
