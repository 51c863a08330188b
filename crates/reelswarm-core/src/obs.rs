//! Structured observability hooks for pipeline run lifecycle events.
//!
//! Provides a run-scoped span guard ([`RunSpan`]) and one emission
//! function per lifecycle event: run start and finish, node entry and
//! exit, quality-gate evaluation, agent fallbacks.

use tracing::{info, warn, Instrument};

/// Run-scoped span, tagged with the project id.
///
/// `EnteredSpan` guards are not `Send`, so async callers attach the span
/// with [`RunSpan::instrument`] instead of entering it.
pub struct RunSpan {
    span: tracing::Span,
}

impl RunSpan {
    pub fn new(project_id: &str, niche: &str) -> Self {
        Self {
            span: tracing::info_span!("reelswarm.run", project_id = %project_id, niche = %niche),
        }
    }

    /// Run `fut` inside the span.
    pub fn instrument<F: std::future::Future>(&self, fut: F) -> tracing::instrument::Instrumented<F> {
        fut.instrument(self.span.clone())
    }
}

pub fn emit_run_started(project_id: &str, niche: &str) {
    info!(event = "run.started", project_id = %project_id, niche = %niche);
}

pub fn emit_run_finished(project_id: &str, duration_ms: u64, nodes_visited: usize, refine_passes: u32) {
    info!(
        event = "run.finished",
        project_id = %project_id,
        duration_ms = duration_ms,
        nodes_visited = nodes_visited,
        refine_passes = refine_passes,
    );
}

pub fn emit_run_aborted(project_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.aborted", project_id = %project_id, error = %error);
}

pub fn emit_node_entered(project_id: &str, node: &str) {
    info!(event = "node.entered", project_id = %project_id, node = %node);
}

pub fn emit_node_exited(project_id: &str, node: &str, duration_ms: u64) {
    info!(event = "node.exited", project_id = %project_id, node = %node, duration_ms = duration_ms);
}

/// Quality gate decision. `forced` means the refine cap overrode the score.
pub fn emit_gate_evaluated(project_id: &str, score: f64, next: &str, forced: bool) {
    info!(
        event = "gate.evaluated",
        project_id = %project_id,
        score = score,
        next = %next,
        forced = forced,
    );
}

pub fn emit_agent_fallback(agent: &str, reason: &str) {
    warn!(event = "agent.fallback", agent = %agent, reason = %reason);
}

#[cfg(test)]
mod tests {
    use super::RunSpan;

    #[tokio::test]
    async fn run_span_wraps_future() {
        let span = RunSpan::new("proj_1", "History");
        let out = span.instrument(async { 41 + 1 }).await;
        assert_eq!(out, 42);
    }
}
