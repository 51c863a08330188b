//! Audit panel: K specialist auditors scoring the same script concurrently.
//!
//! Auditors are data ([`AuditorSpec`]) interpreted by one generic
//! [`SpecialistAuditor`]. The panel waits for every auditor, converts a
//! failed one into a zero-score error entry, and reduces the results with
//! [`reduce_reports`]. Each pass builds its report from scratch.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use reel_store::{AuditReport, AuditorReport, TaggedIssue, Verdict};
use serde_json::Value;
use tracing::{instrument, warn};

use crate::agent::{ask_json, Agent, AgentFailure, AgentOutput};
use crate::context::{script_text, ContextField, FieldValue, Scope, ScriptBlock};
use crate::metrics::METRICS;
use crate::provider::{GenerationRequest, Generator};

/// Maximum tagged issues kept in a report.
pub const MAX_TOP_ISSUES: usize = 5;
/// Maximum quick wins kept in a report.
pub const MAX_QUICK_WINS: usize = 5;
/// Script characters shown to each auditor.
pub const MAX_SCRIPT_CHARS: usize = 12_000;

/// One auditor's identity and rubric.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditorSpec {
    pub name: String,
    pub icon: String,
    pub criteria: Vec<String>,
    pub focus: String,
}

impl AuditorSpec {
    pub fn new(name: &str, icon: &str, criteria: &[&str], focus: &str) -> Self {
        Self {
            name: name.to_string(),
            icon: icon.to_string(),
            criteria: criteria.iter().map(|c| c.to_string()).collect(),
            focus: focus.to_string(),
        }
    }
}

/// The seven-seat reference panel.
pub fn default_panel() -> Vec<AuditorSpec> {
    vec![
        AuditorSpec::new(
            "Creative Director",
            "🎬",
            &["Narrative arc", "Originality", "Emotional payoff", "Cohesion"],
            "Does the story feel like one crafted piece with a clear creative vision?",
        ),
        AuditorSpec::new(
            "Marketing Strategist",
            "📈",
            &["Audience fit", "Shareability", "Positioning", "Call to action"],
            "Will this video grow the channel and convert viewers into subscribers?",
        ),
        AuditorSpec::new(
            "YouTube Expert",
            "🎯",
            &["First 30 seconds", "Title-content match", "Pacing", "Algorithm signals"],
            "Would the platform push this video, and would viewers click and stay?",
        ),
        AuditorSpec::new(
            "Audience Psychologist",
            "🧠",
            &["Curiosity gaps", "Emotional triggers", "Relatability", "Cognitive load"],
            "Which psychological levers keep the viewer watching, and which are missing?",
        ),
        AuditorSpec::new(
            "Content Editor",
            "✍️",
            &["Clarity", "Concision", "Factual accuracy", "Flow between blocks"],
            "Is every sentence necessary, correct and easy to follow when spoken aloud?",
        ),
        AuditorSpec::new(
            "Visual Director",
            "🎨",
            &["Visual potential", "Scene variety", "Show-don't-tell", "B-roll opportunities"],
            "Can each block be illustrated with strong, varied imagery?",
        ),
        AuditorSpec::new(
            "Retention Specialist",
            "🧲",
            &["Open loops", "Pattern interrupts", "Payoff timing", "Drop-off risks"],
            "Where will viewers leave, and what would keep them until the end?",
        ),
    ]
}

/// Generic auditor driven by an [`AuditorSpec`].
pub struct SpecialistAuditor {
    spec: AuditorSpec,
    generator: Arc<dyn Generator>,
}

impl SpecialistAuditor {
    pub fn new(spec: AuditorSpec, generator: Arc<dyn Generator>) -> Self {
        Self { spec, generator }
    }

    pub fn spec(&self) -> &AuditorSpec {
        &self.spec
    }

    /// Score `script` against this auditor's rubric.
    pub async fn evaluate(
        &self,
        topic: &str,
        niche: &str,
        script: &str,
    ) -> Result<AuditorReport, AgentFailure> {
        let criteria = self
            .spec
            .criteria
            .iter()
            .map(|c| format!("- {c}"))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "You are the {name} on a video review panel.\nFocus: {focus}\nCriteria:\n{criteria}\n\n\
             Topic: {topic}\nNiche: {niche}\nScript:\n{script}\n\n\
             Respond with JSON: {{\"score\": 0-10, \"verdict\": \"...\", \"top_issues\": [], \"quick_wins\": []}}",
            name = self.spec.name,
            focus = self.spec.focus,
        );

        let value = ask_json(
            self.generator.as_ref(),
            GenerationRequest::json(&self.spec.name, prompt),
        )
        .await?;

        let score = read_score(&value).ok_or(AgentFailure::Missing("score"))?;
        Ok(AuditorReport {
            auditor: self.spec.name.clone(),
            icon: self.spec.icon.clone(),
            score,
            verdict: value
                .get("verdict")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            top_issues: read_strings(&value, &["top_issues", "issues"]),
            quick_wins: read_strings(&value, &["quick_wins"]),
            error: None,
        })
    }
}

/// Numeric score under `score` or `overall_score`, accepting numbers or
/// numeric strings, clamped to 0..=10.
fn read_score(value: &Value) -> Option<f64> {
    let raw = ["score", "overall_score"].iter().find_map(|k| value.get(*k))?;
    let score = raw
        .as_f64()
        .or_else(|| raw.as_str().and_then(|s| s.trim().parse::<f64>().ok()))?;
    score.is_finite().then(|| score.clamp(0.0, 10.0))
}

/// String list under the first present key; objects contribute their
/// `issue`/`description`/`text` field.
fn read_strings(value: &Value, keys: &[&str]) -> Vec<String> {
    let Some(items) = keys.iter().find_map(|k| value.get(*k)).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(_) => ["issue", "description", "text"]
                .iter()
                .find_map(|k| item.get(*k).and_then(Value::as_str))
                .map(str::to_string),
            _ => None,
        })
        .filter(|s| !s.trim().is_empty())
        .collect()
}

/// Reduce per-auditor results into one report.
///
/// - `global_score`: mean of scores > 0, rounded to one decimal with ties to
///   even (6.25 becomes 6.2); 0 if none.
/// - `top_issues`: first [`MAX_TOP_ISSUES`] issues in auditor order.
/// - `quick_wins`: first-seen unique suggestions, capped at [`MAX_QUICK_WINS`].
pub fn reduce_reports(auditors: Vec<AuditorReport>) -> AuditReport {
    let valid: Vec<f64> = auditors
        .iter()
        .filter(|a| !a.is_error() && a.score > 0.0)
        .map(|a| a.score)
        .collect();
    let global_score = if valid.is_empty() {
        0.0
    } else {
        let mean = valid.iter().sum::<f64>() / valid.len() as f64;
        (mean * 10.0).round_ties_even() / 10.0
    };

    let top_issues = auditors
        .iter()
        .filter(|a| !a.is_error())
        .flat_map(|a| {
            a.top_issues.iter().map(move |issue| TaggedIssue {
                auditor: a.auditor.clone(),
                issue: issue.clone(),
            })
        })
        .take(MAX_TOP_ISSUES)
        .collect();

    let mut seen = HashSet::new();
    let quick_wins = auditors
        .iter()
        .flat_map(|a| a.quick_wins.iter())
        .filter(|w| seen.insert(w.as_str()))
        .take(MAX_QUICK_WINS)
        .cloned()
        .collect();

    AuditReport {
        global_score,
        global_verdict: Verdict::from_score(global_score),
        top_issues,
        quick_wins,
        auditors,
    }
}

/// Fan-out aggregator over a fixed set of auditors.
pub struct AuditPanel {
    auditors: Vec<SpecialistAuditor>,
}

impl AuditPanel {
    pub fn new(specs: Vec<AuditorSpec>, generator: Arc<dyn Generator>) -> Self {
        Self {
            auditors: specs
                .into_iter()
                .map(|spec| SpecialistAuditor::new(spec, Arc::clone(&generator)))
                .collect(),
        }
    }

    /// Panel built from [`default_panel`].
    pub fn standard(generator: Arc<dyn Generator>) -> Self {
        Self::new(default_panel(), generator)
    }

    pub fn len(&self) -> usize {
        self.auditors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.auditors.is_empty()
    }

    /// Run every auditor concurrently and reduce once all have finished.
    #[instrument(skip(self, blocks), fields(auditors = self.auditors.len()))]
    pub async fn audit(&self, topic: &str, niche: &str, blocks: &[ScriptBlock]) -> AuditReport {
        let script = script_text(blocks, MAX_SCRIPT_CHARS);
        let runs = self.auditors.iter().map(|auditor| {
            let script = script.as_str();
            async move {
                match auditor.evaluate(topic, niche, script).await {
                    Ok(report) => report,
                    Err(e) => {
                        warn!(auditor = %auditor.spec.name, error = %e, "auditor failed");
                        METRICS.inc_auditor_failures();
                        AuditorReport::failed(&auditor.spec.name, &auditor.spec.icon, e.to_string())
                    }
                }
            }
        });

        reduce_reports(join_all(runs).await)
    }
}

#[async_trait]
impl Agent for AuditPanel {
    fn name(&self) -> &'static str {
        "AuditPanel"
    }

    fn writes(&self) -> &'static [ContextField] {
        &[ContextField::AuditReport]
    }

    async fn run(&self, scope: &Scope<'_>) -> AgentOutput {
        let report = self
            .audit(&scope.topic(), scope.niche(), scope.final_script())
            .await;
        let failed = report.auditors.iter().filter(|a| a.is_error()).count();

        let values = vec![FieldValue::AuditReport(Some(report))];
        if failed > 0 {
            AgentOutput::fallback(values, format!("{failed} auditor(s) failed"))
        } else {
            AgentOutput::completed(values)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(name: &str, score: f64, issues: &[&str], wins: &[&str]) -> AuditorReport {
        AuditorReport {
            auditor: name.to_string(),
            icon: String::new(),
            score,
            verdict: String::new(),
            top_issues: issues.iter().map(|s| s.to_string()).collect(),
            quick_wins: wins.iter().map(|s| s.to_string()).collect(),
            error: None,
        }
    }

    #[test]
    fn default_panel_has_seven_distinct_seats() {
        let panel = default_panel();
        assert_eq!(panel.len(), 7);
        let names: HashSet<_> = panel.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), 7);
        assert!(panel.iter().all(|s| !s.criteria.is_empty()));
    }

    #[test]
    fn mean_excludes_zero_and_errors() {
        let reduced = reduce_reports(vec![
            report("A", 8.0, &[], &[]),
            report("B", 7.0, &[], &[]),
            report("C", 0.0, &[], &[]),
            AuditorReport::failed("D", "", "boom"),
        ]);
        assert_eq!(reduced.global_score, 7.5);
        assert_eq!(reduced.global_verdict, Verdict::Approved);
        assert_eq!(reduced.auditors.len(), 4);
    }

    #[test]
    fn mean_rounds_to_one_decimal() {
        let reduced = reduce_reports(vec![
            report("A", 7.0, &[], &[]),
            report("B", 6.0, &[], &[]),
            report("C", 6.0, &[], &[]),
        ]);
        assert_eq!(reduced.global_score, 6.3);
        assert_eq!(reduced.global_verdict, Verdict::NeedsReview);
    }

    #[test]
    fn mean_ties_round_to_even() {
        let reduced = reduce_reports(vec![report("A", 6.0, &[], &[]), report("B", 6.5, &[], &[])]);
        assert_eq!(reduced.global_score, 6.2);
    }

    #[test]
    fn all_errors_score_zero() {
        let reduced = reduce_reports(vec![
            AuditorReport::failed("A", "", "x"),
            AuditorReport::failed("B", "", "y"),
        ]);
        assert_eq!(reduced.global_score, 0.0);
        assert!(reduced.top_issues.is_empty());
    }

    #[test]
    fn issues_keep_auditor_order_and_cap() {
        let reduced = reduce_reports(vec![
            report("A", 5.0, &["a1", "a2", "a3"], &[]),
            report("B", 5.0, &["b1", "b2", "b3"], &[]),
        ]);
        let tags: Vec<_> = reduced
            .top_issues
            .iter()
            .map(|i| format!("{}:{}", i.auditor, i.issue))
            .collect();
        assert_eq!(tags, vec!["A:a1", "A:a2", "A:a3", "B:b1", "B:b2"]);
    }

    #[test]
    fn quick_wins_dedupe_and_cap() {
        let reduced = reduce_reports(vec![
            report("A", 5.0, &[], &["w1", "w2", "w1"]),
            report("B", 5.0, &[], &["w2", "w3", "w4", "w5", "w6"]),
        ]);
        assert_eq!(reduced.quick_wins, vec!["w1", "w2", "w3", "w4", "w5"]);
    }

    #[test]
    fn score_parsing_is_lenient() {
        assert_eq!(read_score(&json!({"score": 8})), Some(8.0));
        assert_eq!(read_score(&json!({"score": " 6.5 "})), Some(6.5));
        assert_eq!(read_score(&json!({"score": 14})), Some(10.0));
        assert_eq!(read_score(&json!({"score": "high"})), None);
        assert_eq!(read_score(&json!({"verdict": "ok"})), None);
        assert_eq!(read_score(&json!({"overall_score": 9})), Some(9.0));
        assert_eq!(read_score(&json!({"score": 4, "overall_score": 9})), Some(4.0));
    }

    #[test]
    fn string_lists_accept_objects() {
        let value = json!({"issues": ["plain", {"issue": "nested"}, {"other": 1}, ""]});
        assert_eq!(read_strings(&value, &["top_issues", "issues"]), vec!["plain", "nested"]);
    }
}
