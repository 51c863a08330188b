//! Phase composition: disjoint parallel writes, chain visibility, fallbacks.

use std::sync::Arc;
use std::time::Duration;

use reelswarm_core::agents::{
    AudienceProfiler, CompetitorAnalyst, SeoOptimizer, TrendHunter,
};
use reelswarm_core::fakes::{MemorySink, ScriptedGenerator, StubMedia};
use reelswarm_core::{
    Context, NodePhases, NotificationKind, PhaseError, Phase, ScriptBlock, Step,
};

const STRATEGY_AGENTS: [&str; 3] = ["TrendHunter", "AudienceProfiler", "CompetitorAnalyst"];

fn strategy_group(generator: Arc<ScriptedGenerator>) -> Phase {
    Phase::new(
        "strategy",
        vec![Step::parallel(vec![
            Step::agent(TrendHunter::new(generator.clone())),
            Step::agent(AudienceProfiler::new(generator.clone())),
            Step::agent(CompetitorAnalyst::new(generator)),
        ])],
    )
    .unwrap()
}

async fn run_with_delays(delays: [u64; 3]) -> Context {
    let mut generator = ScriptedGenerator::happy();
    for (agent, secs) in STRATEGY_AGENTS.iter().zip(delays) {
        generator = generator.delay(agent, Duration::from_secs(secs));
    }
    let phase = strategy_group(Arc::new(generator));
    let mut ctx = Context::new("proj_test", "Ancient Rome");
    phase.run(&mut ctx, &MemorySink::new()).await.unwrap();
    ctx
}

#[tokio::test(start_paused = true)]
async fn test_disjoint_writes_commute_across_completion_orders() {
    let first = run_with_delays([1, 2, 3]).await;
    let second = run_with_delays([3, 2, 1]).await;
    let third = run_with_delays([2, 3, 1]).await;

    assert_eq!(first, second);
    assert_eq!(second, third);
    assert!(first.trends.is_array());
    assert!(first.audience_profile.is_object());
    assert!(first.competitor_analysis.is_object());
}

#[tokio::test(start_paused = true)]
async fn test_parallel_group_waits_for_slowest_branch() {
    let generator = ScriptedGenerator::happy().delay("CompetitorAnalyst", Duration::from_secs(30));
    let phase = strategy_group(Arc::new(generator));
    let mut ctx = Context::new("proj_test", "Ancient Rome");

    let started = tokio::time::Instant::now();
    phase.run(&mut ctx, &MemorySink::new()).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(30));
    assert!(ctx.competitor_analysis.get("content_gaps").is_some());
}

#[test]
fn test_overlapping_parallel_writers_are_rejected() {
    let generator = Arc::new(ScriptedGenerator::new());
    let err = Phase::new(
        "assets",
        vec![Step::parallel(vec![
            Step::agent(SeoOptimizer::new(generator.clone())),
            Step::sequence(vec![Step::agent(SeoOptimizer::new(generator))]),
        ])],
    )
    .unwrap_err();

    match err {
        PhaseError::OverlappingWrites { phase, field } => {
            assert_eq!(phase, "assets");
            assert_eq!(field, "seo_package");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_same_field_in_one_chain_is_allowed() {
    let generator = Arc::new(ScriptedGenerator::new());
    let phase = Phase::new(
        "seo",
        vec![Step::parallel(vec![Step::sequence(vec![
            Step::agent(SeoOptimizer::new(generator.clone())),
            Step::agent(SeoOptimizer::new(generator)),
        ])])],
    );
    assert!(phase.is_ok());
}

#[tokio::test]
async fn test_chain_inside_parallel_group_sees_its_own_outputs() {
    let generator = Arc::new(
        ScriptedGenerator::happy().respond("PromptEngineer", |req, _| Ok(req.prompt.clone())),
    );
    let phases = NodePhases::standard(generator, Arc::new(StubMedia::new())).unwrap();
    let mut ctx = Context::new("proj_test", "Ancient Rome");
    ctx.final_script = vec![
        ScriptBlock::new(0, "HOOK", "Listen."),
        ScriptBlock::new(1, "CTA", "Subscribe."),
    ];

    phases.assets.run(&mut ctx, &MemorySink::new()).await.unwrap();

    assert_eq!(ctx.visual_prompts.len(), 2);
    assert!(ctx.visual_prompts[0].prompt.contains("Style: Oil painting"));
    assert!(ctx.visual_prompts[1].prompt.contains("Narration: Subscribe."));
    assert_eq!(ctx.visual_prompts[1].index, 1);
    assert!(ctx.seo_package.get("titles").is_some());
    assert!(ctx.audio_instructions.get("audio_notes").is_some());
}

#[tokio::test]
async fn test_every_fallback_is_reported() {
    let phase = strategy_group(Arc::new(ScriptedGenerator::new()));
    let sink = MemorySink::new();
    let mut ctx = Context::new("proj_test", "Ancient Rome");

    let report = phase.run(&mut ctx, &sink).await.unwrap();

    assert_eq!(report.fallbacks().count(), 3);
    assert_eq!(sink.count(NotificationKind::Warning), 3);
    assert_eq!(sink.count(NotificationKind::DataUpdate), 3);
    assert_eq!(ctx.trends, TrendHunter::fallback("Ancient Rome"));
    assert_eq!(ctx.audience_profile, AudienceProfiler::fallback());
    assert_eq!(ctx.competitor_analysis, CompetitorAnalyst::fallback());
}
