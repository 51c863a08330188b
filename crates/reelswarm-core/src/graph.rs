//! The workflow graph.
//!
//! ```text
//! strategy -> research -> scripting -> quality_check -+-> assets -> media -> done
//!                                          ^          |
//!                                          +- refine <+
//! ```
//!
//! `quality_check` is the only branch point. Every other edge is fixed.
//! Cancellation is cooperative: the [`RunToken`] is checked on entry to each
//! work node, never in the middle of one.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use reel_store::AuditReport;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::agents::{
    ArtDirector, AudienceProfiler, AudioDirector, ComedySpecialist, CompetitorAnalyst,
    DeepResearcher, FactChecker, HookMaster, ImageRenderer, InvestigativeJournalist, LeadWriter,
    Narrator, ProjectManager, PromptEngineer, ScriptArchitect, ScriptRefiner, SeoOptimizer,
    ThumbnailRenderer, ThumbnailStrategist, TrendHunter,
};
use crate::audit::AuditPanel;
use crate::context::Context;
use crate::error::{PhaseError, Result, SwarmError};
use crate::metrics::METRICS;
use crate::notify::NotificationSink;
use crate::obs;
use crate::phase::{Phase, Step};
use crate::provider::{Generator, MediaSynthesizer};
use crate::settings::Settings;

/// A state of the workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Strategy,
    Research,
    Scripting,
    QualityCheck,
    Refine,
    Assets,
    Media,
    Done,
}

impl Node {
    pub const ENTRY: Node = Node::Strategy;

    pub fn as_str(self) -> &'static str {
        match self {
            Node::Strategy => "strategy",
            Node::Research => "research",
            Node::Scripting => "scripting",
            Node::QualityCheck => "quality_check",
            Node::Refine => "refine",
            Node::Assets => "assets",
            Node::Media => "media",
            Node::Done => "done",
        }
    }

    /// Fixed successor. `quality_check` is resolved by the gate instead.
    fn successor(self) -> Node {
        match self {
            Node::Strategy => Node::Research,
            Node::Research => Node::Scripting,
            Node::Scripting => Node::QualityCheck,
            Node::Refine => Node::QualityCheck,
            Node::QualityCheck => Node::Assets,
            Node::Assets => Node::Media,
            Node::Media | Node::Done => Node::Done,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared stop request.
///
/// `stop()` advances an epoch. Each run captures the epoch it started in, so
/// a stop reaches exactly the runs in flight when it was requested.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    epoch: Arc<AtomicU64>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Token for a run starting now.
    pub fn token(&self) -> RunToken {
        RunToken {
            epoch: Arc::clone(&self.epoch),
            started: self.epoch.load(Ordering::SeqCst),
        }
    }
}

/// One run's view of the [`StopSignal`].
#[derive(Debug, Clone)]
pub struct RunToken {
    epoch: Arc<AtomicU64>,
    started: u64,
}

impl RunToken {
    pub fn is_stopped(&self) -> bool {
        self.epoch.load(Ordering::SeqCst) != self.started
    }

    /// Node-entry check point.
    pub fn check(&self, node: Node) -> Result<()> {
        if self.is_stopped() {
            return Err(SwarmError::StopRequested { node });
        }
        Ok(())
    }
}

/// Quality gate configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GatePolicy {
    pub threshold: f64,
    /// `None` lets refine loop until the score passes.
    pub max_refine: Option<u32>,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            threshold: reel_store::APPROVAL_SCORE,
            max_refine: Some(3),
        }
    }
}

impl GatePolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            threshold: settings.quality_threshold,
            max_refine: settings.max_refine_iterations,
        }
    }
}

/// Outcome of the quality gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateDecision {
    pub score: f64,
    pub next: Node,
    /// The refine cap sent a failing script forward.
    pub forced: bool,
}

/// Pick `refine` or `assets`. A missing report scores 0.
pub fn decide(policy: &GatePolicy, report: Option<&AuditReport>, refine_passes: u32) -> GateDecision {
    let score = report.map(|r| r.global_score).unwrap_or(0.0);
    if score >= policy.threshold {
        return GateDecision {
            score,
            next: Node::Assets,
            forced: false,
        };
    }
    let exhausted = policy.max_refine.is_some_and(|cap| refine_passes >= cap);
    GateDecision {
        score,
        next: if exhausted { Node::Assets } else { Node::Refine },
        forced: exhausted,
    }
}

/// The phase bound to each work node.
#[derive(Debug, Clone)]
pub struct NodePhases {
    pub strategy: Phase,
    pub research: Phase,
    pub scripting: Phase,
    pub quality_check: Phase,
    pub refine: Phase,
    pub assets: Phase,
    pub media: Phase,
}

impl NodePhases {
    /// Reference composition of every node.
    pub fn standard(
        generator: Arc<dyn Generator>,
        media: Arc<dyn MediaSynthesizer>,
    ) -> std::result::Result<Self, PhaseError> {
        let g = || Arc::clone(&generator);
        let m = || Arc::clone(&media);

        Ok(Self {
            strategy: Phase::new(
                Node::Strategy.as_str(),
                vec![
                    Step::parallel(vec![
                        Step::agent(TrendHunter::new(g())),
                        Step::agent(AudienceProfiler::new(g())),
                        Step::agent(CompetitorAnalyst::new(g())),
                    ]),
                    Step::agent(ProjectManager::new(g())),
                ],
            )?,
            research: Phase::new(
                Node::Research.as_str(),
                vec![
                    Step::parallel(vec![
                        Step::agent(DeepResearcher::new(g())),
                        Step::agent(InvestigativeJournalist::new(g())),
                    ]),
                    Step::agent(FactChecker::new(g())),
                ],
            )?,
            scripting: Phase::new(
                Node::Scripting.as_str(),
                vec![
                    Step::agent(ScriptArchitect::new(g())),
                    Step::agent(LeadWriter::new(g())),
                    Step::agent(HookMaster::new(g())),
                    Step::agent(ComedySpecialist::new(g())),
                ],
            )?,
            quality_check: Phase::new(
                Node::QualityCheck.as_str(),
                vec![Step::agent(AuditPanel::standard(g()))],
            )?,
            refine: Phase::new(Node::Refine.as_str(), vec![Step::agent(ScriptRefiner::new(g()))])?,
            assets: Phase::new(
                Node::Assets.as_str(),
                vec![Step::parallel(vec![
                    Step::sequence(vec![
                        Step::agent(ArtDirector::new(g())),
                        Step::agent(PromptEngineer::new(g())),
                        Step::agent(ThumbnailStrategist::new(g())),
                    ]),
                    Step::agent(AudioDirector::new(g())),
                    Step::agent(SeoOptimizer::new(g())),
                ])],
            )?,
            media: Phase::new(
                Node::Media.as_str(),
                vec![
                    Step::agent(ImageRenderer::new(m())),
                    Step::agent(ThumbnailRenderer::new(m())),
                    Step::agent(Narrator::new(m())),
                ],
            )?,
        })
    }

    fn get(&self, node: Node) -> Option<&Phase> {
        match node {
            Node::Strategy => Some(&self.strategy),
            Node::Research => Some(&self.research),
            Node::Scripting => Some(&self.scripting),
            Node::QualityCheck => Some(&self.quality_check),
            Node::Refine => Some(&self.refine),
            Node::Assets => Some(&self.assets),
            Node::Media => Some(&self.media),
            Node::Done => None,
        }
    }
}

/// Path a run took through the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphTrace {
    /// Every node visited, in order, ending with `done`.
    pub visited: Vec<Node>,
    pub refine_passes: u32,
}

impl GraphTrace {
    pub fn visits(&self, node: Node) -> usize {
        self.visited.iter().filter(|n| **n == node).count()
    }
}

/// Node phases plus the gate that connects them.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    phases: NodePhases,
    gate: GatePolicy,
}

impl WorkflowGraph {
    pub fn new(phases: NodePhases, gate: GatePolicy) -> Self {
        Self { phases, gate }
    }

    /// Drive `ctx` from the entry node to `done`.
    ///
    /// Any node error, including a stop request, ends the run.
    pub async fn run(
        &self,
        ctx: &mut Context,
        token: &RunToken,
        sink: &dyn NotificationSink,
    ) -> Result<GraphTrace> {
        let mut trace = GraphTrace::default();
        let mut node = Node::ENTRY;

        while let Some(phase) = self.phases.get(node) {
            token.check(node)?;
            obs::emit_node_entered(&ctx.project_id, node.as_str());
            sink.info(&format!("Entering {node}"));
            trace.visited.push(node);
            let started = Instant::now();

            phase.run(ctx, sink).await?;

            let next = match node {
                Node::QualityCheck => self.evaluate_gate(ctx, trace.refine_passes, sink),
                Node::Refine => {
                    trace.refine_passes += 1;
                    METRICS.inc_refine_passes();
                    node.successor()
                }
                other => other.successor(),
            };

            obs::emit_node_exited(&ctx.project_id, node.as_str(), started.elapsed().as_millis() as u64);
            node = next;
        }

        trace.visited.push(Node::Done);
        Ok(trace)
    }

    fn evaluate_gate(&self, ctx: &Context, refine_passes: u32, sink: &dyn NotificationSink) -> Node {
        let decision = decide(&self.gate, ctx.audit_report.as_ref(), refine_passes);
        obs::emit_gate_evaluated(&ctx.project_id, decision.score, decision.next.as_str(), decision.forced);

        if decision.forced {
            warn!(
                project_id = %ctx.project_id,
                score = decision.score,
                refine_passes,
                "refine limit reached, proceeding to assets"
            );
            sink.warning(&format!(
                "Quality score {:.1} is below {:.1} after {refine_passes} refine pass(es); continuing anyway",
                decision.score, self.gate.threshold
            ));
        } else {
            sink.info(&format!("Quality score {:.1}, next: {}", decision.score, decision.next));
        }
        decision.next
    }
}
