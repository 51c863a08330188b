//! Persisted schema for compiled projects and audit reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scores at or above this value are approved.
pub const APPROVAL_SCORE: f64 = 7.0;

/// Global verdict of an audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Approved,
    NeedsReview,
}

impl Verdict {
    /// Derive the verdict from a global score.
    pub fn from_score(score: f64) -> Self {
        if score >= APPROVAL_SCORE {
            Verdict::Approved
        } else {
            Verdict::NeedsReview
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Approved => write!(f, "approved"),
            Verdict::NeedsReview => write!(f, "needs-review"),
        }
    }
}

/// An issue attributed to the auditor that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedIssue {
    pub auditor: String,
    pub issue: String,
}

/// Findings of a single auditor.
///
/// A failed auditor carries `error` and a zero score; it never contributes
/// to the global score or the issue list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditorReport {
    pub auditor: String,
    pub icon: String,
    pub score: f64,
    pub verdict: String,
    #[serde(default)]
    pub top_issues: Vec<String>,
    #[serde(default)]
    pub quick_wins: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditorReport {
    /// Zero-score entry recorded when an auditor fails.
    pub fn failed(auditor: &str, icon: &str, error: impl Into<String>) -> Self {
        Self {
            auditor: auditor.to_string(),
            icon: icon.to_string(),
            score: 0.0,
            verdict: "error".to_string(),
            top_issues: Vec::new(),
            quick_wins: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Reduced result of one audit panel pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub global_score: f64,
    pub global_verdict: Verdict,
    pub top_issues: Vec<TaggedIssue>,
    pub quick_wins: Vec<String>,
    pub auditors: Vec<AuditorReport>,
}

/// Lifecycle label of a stored project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    Completed,
    Audited,
    AutoFixed,
    Edited,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ProjectStatus::Completed => "completed",
            ProjectStatus::Audited => "audited",
            ProjectStatus::AutoFixed => "auto-fixed",
            ProjectStatus::Edited => "edited",
        };
        f.write_str(label)
    }
}

/// One segment of the compiled video script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledBlock {
    pub index: usize,
    pub section: String,
    pub narration: String,
    #[serde(default)]
    pub visual_prompt: Option<String>,
    pub word_count: usize,
    pub duration_seconds: f64,
    #[serde(default)]
    pub audio_file: Option<String>,
    #[serde(default)]
    pub image_file: Option<String>,
}

/// Publishing metadata derived from the SEO package and thumbnail concept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub thumbnail_prompt: Option<String>,
    #[serde(default)]
    pub thumbnail_file: Option<String>,
}

/// Snapshot of a completed pipeline run.
///
/// Records are superseded wholesale on update; stores never patch
/// individual fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub niche: String,
    pub topic: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: ProjectStatus,
    pub script: Vec<CompiledBlock>,
    pub metadata: ProjectMetadata,

    // Intermediate artifacts kept for traceability.
    #[serde(default)]
    pub trends: Value,
    #[serde(default)]
    pub audience_profile: Value,
    #[serde(default)]
    pub competitor_analysis: Value,
    #[serde(default)]
    pub project_bible: Value,
    #[serde(default)]
    pub verified_research: String,
    #[serde(default)]
    pub outline: Value,
    #[serde(default)]
    pub art_direction: Value,
    #[serde(default)]
    pub audio_instructions: Value,
    #[serde(default)]
    pub seo_package: Value,
    #[serde(default)]
    pub audit_report: Option<AuditReport>,
}

impl ProjectRecord {
    /// Create an empty completed record for `id`.
    pub fn new(id: &str, niche: &str, topic: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            niche: niche.to_string(),
            topic: topic.to_string(),
            created_at: now,
            updated_at: now,
            status: ProjectStatus::Completed,
            script: Vec::new(),
            metadata: ProjectMetadata::default(),
            trends: Value::Null,
            audience_profile: Value::Null,
            competitor_analysis: Value::Null,
            project_bible: Value::Null,
            verified_research: String::new(),
            outline: Value::Null,
            art_direction: Value::Null,
            audio_instructions: Value::Null,
            seo_package: Value::Null,
            audit_report: None,
        }
    }

    /// Total narrated duration across all blocks.
    pub fn total_duration(&self) -> f64 {
        self.script.iter().map(|b| b.duration_seconds).sum()
    }

    /// Stamp `updated_at` and set the status before a rewrite.
    pub fn touch(&mut self, status: ProjectStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_boundary_is_inclusive() {
        assert_eq!(Verdict::from_score(7.0), Verdict::Approved);
        assert_eq!(Verdict::from_score(6.9), Verdict::NeedsReview);
        assert_eq!(Verdict::from_score(0.0), Verdict::NeedsReview);
    }

    #[test]
    fn verdict_serializes_kebab_case() {
        let json = serde_json::to_string(&Verdict::NeedsReview).unwrap();
        assert_eq!(json, "\"needs-review\"");
    }

    #[test]
    fn record_tolerates_missing_artifacts() {
        let json = serde_json::json!({
            "id": "proj_1",
            "niche": "History",
            "topic": "Rome",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
            "status": "completed",
            "script": [],
            "metadata": {"title": "Rome", "description": ""}
        });
        let record: ProjectRecord = serde_json::from_value(json).unwrap();
        assert!(record.audit_report.is_none());
        assert!(record.trends.is_null());
        assert!(record.metadata.tags.is_empty());
    }

    #[test]
    fn total_duration_sums_blocks() {
        let mut record = ProjectRecord::new("p", "n", "t");
        for (i, d) in [10.0, 20.5].into_iter().enumerate() {
            record.script.push(CompiledBlock {
                index: i,
                section: "HOOK".to_string(),
                narration: "x".to_string(),
                visual_prompt: None,
                word_count: 1,
                duration_seconds: d,
                audio_file: None,
                image_file: None,
            });
        }
        assert!((record.total_duration() - 30.5).abs() < f64::EPSILON);
    }
}
