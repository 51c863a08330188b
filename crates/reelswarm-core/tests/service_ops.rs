//! Pipeline service: background start, stop, and edits on saved projects.

use std::sync::Arc;

use reel_store::fakes::MemoryProjectStore;
use reel_store::{
    AuditReport, AuditorReport, CompiledBlock, ProjectRecord, ProjectStatus, ProjectStore,
    TaggedIssue, Verdict,
};
use reelswarm_core::fakes::{MemorySink, ScriptedGenerator, StubMedia, HAPPY_BLOCKS};
use reelswarm_core::{
    NotificationKind, Orchestrator, PipelineService, ServiceHandles, Settings, SwarmError,
};

struct Harness {
    service: PipelineService,
    store: Arc<MemoryProjectStore>,
    generator: Arc<ScriptedGenerator>,
    sink: Arc<MemorySink>,
}

fn harness(generator: ScriptedGenerator, media: StubMedia) -> Harness {
    let generator = Arc::new(generator);
    let store = Arc::new(MemoryProjectStore::new());
    let sink = Arc::new(MemorySink::new());
    let handles = ServiceHandles::new(generator.clone(), Arc::new(media));
    let orchestrator = Orchestrator::from_handles(
        &handles,
        &Settings::default(),
        store.clone(),
        sink.clone(),
    )
    .unwrap();
    Harness {
        service: PipelineService::new(orchestrator, handles),
        store,
        generator,
        sink,
    }
}

fn block(index: usize, narration: &str) -> CompiledBlock {
    CompiledBlock {
        index,
        section: "DEVELOPMENT".to_string(),
        narration: narration.to_string(),
        visual_prompt: None,
        word_count: narration.split_whitespace().count(),
        duration_seconds: 30.0,
        audio_file: None,
        image_file: None,
    }
}

async fn seed(store: &MemoryProjectStore, with_audit: bool) -> ProjectRecord {
    let mut record = ProjectRecord::new("proj_1_abc", "History", "The Fall of Rome");
    record.script = vec![block(0, "Rome fell slowly."), block(1, "Subscribe now.")];
    if with_audit {
        record.audit_report = Some(AuditReport {
            global_score: 5.0,
            global_verdict: Verdict::NeedsReview,
            top_issues: vec![TaggedIssue {
                auditor: "Content Editor".to_string(),
                issue: "Too vague".to_string(),
            }],
            quick_wins: vec![],
            auditors: vec![AuditorReport {
                auditor: "Content Editor".to_string(),
                icon: "✍️".to_string(),
                score: 5.0,
                verdict: "weak".to_string(),
                top_issues: vec!["Too vague".to_string()],
                quick_wins: vec![],
                error: None,
            }],
        });
    }
    store.upsert(&record).await.unwrap();
    record
}

/// Editor that reports which critique it was given.
fn echoing_editor() -> ScriptedGenerator {
    ScriptedGenerator::happy().respond("Editor", |req, _| {
        let source = if req.prompt.contains("Panel verdict: needs-review (5.0/10)") {
            "panel"
        } else if req.prompt.contains("Improve the wording.") {
            "default"
        } else {
            "custom"
        };
        Ok(format!("rewritten by {source}"))
    })
}

#[tokio::test]
async fn test_start_acknowledges_then_saves_in_background() {
    let h = harness(ScriptedGenerator::happy(), StubMedia::new());

    let (ack, handle) = h.service.spawn_run("Ancient Rome");
    assert_eq!(ack.status, "started");
    assert_eq!(ack.niche, "Ancient Rome");
    assert!(ack.project_id.starts_with("proj_"));

    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome.record.id, ack.project_id);

    let saved = h.service.get_project(&ack.project_id).await.unwrap();
    assert_eq!(saved.script.len(), HAPPY_BLOCKS);
    assert_eq!(h.service.list_projects().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_stop_after_start_aborts_without_saving() {
    let h = harness(ScriptedGenerator::happy(), StubMedia::new());

    let (ack, handle) = h.service.spawn_run("Ancient Rome");
    h.service.stop();

    let err = handle.await.unwrap().unwrap_err();
    assert!(err.is_stop());
    assert!(h.store.is_empty());
    assert!(matches!(
        h.service.get_project(&ack.project_id).await,
        Err(SwarmError::ProjectNotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_removes_record_once() {
    let h = harness(ScriptedGenerator::happy(), StubMedia::new());
    let record = seed(&h.store, false).await;

    h.service.delete_project(&record.id).await.unwrap();
    assert!(h.store.is_empty());
    assert!(matches!(
        h.service.delete_project(&record.id).await,
        Err(SwarmError::ProjectNotFound(_))
    ));
}

#[tokio::test]
async fn test_audit_project_attaches_fresh_report() {
    let h = harness(ScriptedGenerator::happy().audit_scores(&[6.0]), StubMedia::new());
    let record = seed(&h.store, true).await;

    let audited = h.service.audit_project(&record.id).await.unwrap();

    let report = audited.audit_report.as_ref().unwrap();
    assert_eq!(report.global_score, 6.0);
    assert_eq!(report.auditors.len(), 7);
    assert_eq!(audited.status, ProjectStatus::Audited);
    assert!(audited.updated_at >= record.updated_at);
    assert_eq!(h.store.get(&record.id).await.unwrap().unwrap(), audited);
}

#[tokio::test]
async fn test_autofix_uses_panel_critique() {
    let h = harness(echoing_editor(), StubMedia::new());
    let record = seed(&h.store, true).await;

    let fixed = h.service.autofix_project(&record.id, None).await.unwrap();

    assert_eq!(fixed.status, ProjectStatus::AutoFixed);
    assert!(fixed.script.iter().all(|b| b.narration == "rewritten by panel"));
    assert_eq!(fixed.script[0].word_count, 3);
    assert_eq!(h.generator.calls("Editor"), 2);
}

#[tokio::test]
async fn test_autofix_prefers_explicit_instruction() {
    let h = harness(echoing_editor(), StubMedia::new());
    let record = seed(&h.store, true).await;

    let fixed = h
        .service
        .autofix_project(&record.id, Some("Make it funnier"))
        .await
        .unwrap();
    assert!(fixed.script.iter().all(|b| b.narration == "rewritten by custom"));
}

#[tokio::test]
async fn test_autofix_without_any_critique_is_rejected() {
    let h = harness(echoing_editor(), StubMedia::new());
    let record = seed(&h.store, false).await;

    let err = h.service.autofix_project(&record.id, None).await.unwrap_err();
    assert!(matches!(err, SwarmError::MissingInput(_)));
    assert_eq!(h.generator.calls("Editor"), 0);
}

#[tokio::test]
async fn test_refine_block_touches_only_that_block() {
    let h = harness(echoing_editor(), StubMedia::new());
    let record = seed(&h.store, false).await;

    let edited = h.service.refine_block(&record.id, 1, None).await.unwrap();

    assert_eq!(edited.script[0].narration, "Rome fell slowly.");
    assert_eq!(edited.script[1].narration, "rewritten by default");
    assert_eq!(edited.status, ProjectStatus::Edited);

    let err = h.service.refine_block(&record.id, 9, None).await.unwrap_err();
    assert!(matches!(err, SwarmError::BlockNotFound { index: 9, .. }));
}

#[tokio::test]
async fn test_regenerate_visual_prompt_sets_prompt() {
    let h = harness(ScriptedGenerator::happy(), StubMedia::new());
    let record = seed(&h.store, false).await;

    let edited = h.service.regenerate_visual_prompt(&record.id, 0).await.unwrap();
    assert_eq!(
        edited.script[0].visual_prompt.as_deref(),
        Some("A sharper line of narration.")
    );
    assert_eq!(edited.script[1].visual_prompt, None);
}

#[tokio::test]
async fn test_regenerate_thumbnail_needs_saved_prompt() {
    let h = harness(ScriptedGenerator::happy(), StubMedia::new());
    let mut record = seed(&h.store, false).await;

    let err = h.service.regenerate_thumbnail(&record.id).await.unwrap_err();
    assert!(matches!(err, SwarmError::MissingInput(_)));

    record.metadata.thumbnail_prompt = Some("A cracked column".to_string());
    h.store.upsert(&record).await.unwrap();

    let edited = h.service.regenerate_thumbnail(&record.id).await.unwrap();
    assert_eq!(
        edited.metadata.thumbnail_file.as_deref(),
        Some("proj_1_abc_thumbnail.png")
    );
}

#[tokio::test]
async fn test_regenerate_block_image_uses_saved_prompt() {
    let h = harness(ScriptedGenerator::happy(), StubMedia::new());
    let mut record = seed(&h.store, false).await;

    let err = h.service.regenerate_block_image(&record.id, 1).await.unwrap_err();
    assert!(matches!(err, SwarmError::MissingInput(_)));

    record.script[1].visual_prompt = Some("Empty forum at dawn".to_string());
    h.store.upsert(&record).await.unwrap();

    let edited = h.service.regenerate_block_image(&record.id, 1).await.unwrap();
    assert_eq!(edited.script[1].image_file.as_deref(), Some("proj_1_abc_img_1.png"));
    assert_eq!(edited.script[0].image_file, None);
    assert_eq!(edited.status, ProjectStatus::Edited);

    let err = h.service.regenerate_block_image(&record.id, 7).await.unwrap_err();
    assert!(matches!(err, SwarmError::BlockNotFound { index: 7, .. }));
}

#[tokio::test]
async fn test_regenerate_all_images_recovers_gaps_and_keeps_failures() {
    let h = harness(ScriptedGenerator::happy(), StubMedia::new().failing_image("img_0"));
    let mut record = seed(&h.store, false).await;
    record.metadata.thumbnail_prompt = Some("A cracked column".to_string());
    record.script[0].visual_prompt = Some("Senate in session".to_string());
    record.script[0].image_file = Some("old_0.png".to_string());
    record.script[1].visual_prompt = Some("Empty forum at dawn".to_string());
    h.store.upsert(&record).await.unwrap();

    let edited = h.service.regenerate_all_images(&record.id).await.unwrap();

    assert_eq!(
        edited.metadata.thumbnail_file.as_deref(),
        Some("proj_1_abc_thumbnail.png")
    );
    assert_eq!(edited.script[0].image_file.as_deref(), Some("old_0.png"));
    assert_eq!(edited.script[1].image_file.as_deref(), Some("proj_1_abc_img_1.png"));
    assert_eq!(edited.status, ProjectStatus::Edited);
    assert_eq!(h.store.get(&record.id).await.unwrap().unwrap(), edited);
    assert!(h
        .sink
        .messages(NotificationKind::Warning)
        .iter()
        .any(|m| m.contains("1 image(s)")));
}

#[tokio::test]
async fn test_regenerate_all_images_skips_items_without_prompts() {
    let h = harness(ScriptedGenerator::happy(), StubMedia::new());
    let record = seed(&h.store, false).await;

    let edited = h.service.regenerate_all_images(&record.id).await.unwrap();

    assert!(edited.script.iter().all(|b| b.image_file.is_none()));
    assert_eq!(edited.metadata.thumbnail_file, None);
    assert_eq!(h.sink.count(NotificationKind::Warning), 0);
}

#[tokio::test]
async fn test_retry_block_audio_replaces_clip() {
    let h = harness(ScriptedGenerator::happy(), StubMedia::new());
    let record = seed(&h.store, false).await;

    let edited = h.service.retry_block_audio(&record.id, 0).await.unwrap();
    assert_eq!(edited.script[0].audio_file.as_deref(), Some("proj_1_abc_0.wav"));
    assert_eq!(edited.script[0].duration_seconds, 1.5);
}

#[tokio::test]
async fn test_retry_block_audio_surfaces_provider_failure() {
    let h = harness(ScriptedGenerator::happy(), StubMedia::new().failing_speech(1));
    let record = seed(&h.store, false).await;

    let err = h.service.retry_block_audio(&record.id, 1).await.unwrap_err();
    assert!(matches!(err, SwarmError::Provider(_)));
    let unchanged = h.service.get_project(&record.id).await.unwrap();
    assert_eq!(unchanged, record);
}

#[tokio::test]
async fn test_text_tools_return_editor_output() {
    let h = harness(ScriptedGenerator::happy(), StubMedia::new());

    let longer = h.service.expand_text("Rome fell.", "Late antiquity").await.unwrap();
    let shorter = h.service.shorten_text("Rome fell, slowly, over centuries.").await.unwrap();
    assert_eq!(longer, "A sharper line of narration.");
    assert_eq!(shorter, "A sharper line of narration.");
}

#[tokio::test]
async fn test_unknown_project_is_not_found() {
    let h = harness(ScriptedGenerator::happy(), StubMedia::new());
    for result in [
        h.service.get_project("missing").await.map(|_| ()),
        h.service.audit_project("missing").await.map(|_| ()),
        h.service.retry_block_audio("missing", 0).await.map(|_| ()),
    ] {
        assert!(matches!(result, Err(SwarmError::ProjectNotFound(_))));
    }
}
