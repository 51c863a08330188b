//! Phase composition: sequential steps and parallel groups of agents.
//!
//! Top-level steps run in order and their values are applied as soon as each
//! step finishes. A parallel group starts every branch at once, waits for all
//! of them, then applies the staged values branch by branch. A branch is a
//! single agent or a flat sequence of agents; a sequence sees its own earlier
//! outputs through a [`Scope`] overlay.
//!
//! Parallel branches must write disjoint fields. [`Phase::new`] rejects a
//! group whose branches overlap, so concurrent writes never collide.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::json;
use tracing::debug;

use crate::agent::{Agent, Outcome};
use crate::context::{Context, ContextField, FieldValue, Scope};
use crate::error::PhaseError;
use crate::metrics::METRICS;
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::obs;

/// One unit of phase structure.
#[derive(Clone)]
pub enum Step {
    Agent(Arc<dyn Agent>),
    Parallel(Vec<Step>),
    Sequence(Vec<Step>),
}

impl Step {
    pub fn agent(agent: impl Agent + 'static) -> Self {
        Step::Agent(Arc::new(agent))
    }

    pub fn parallel(steps: Vec<Step>) -> Self {
        Step::Parallel(steps)
    }

    pub fn sequence(steps: Vec<Step>) -> Self {
        Step::Sequence(steps)
    }

    /// Every field any agent under this step may write.
    pub fn writes(&self) -> BTreeSet<ContextField> {
        match self {
            Step::Agent(agent) => agent.writes().iter().copied().collect(),
            Step::Parallel(steps) | Step::Sequence(steps) => {
                steps.iter().flat_map(Step::writes).collect()
            }
        }
    }
}

/// How one agent finished inside a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRun {
    pub agent: &'static str,
    pub outcome: Outcome,
}

/// Agents a phase ran, in completion-application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseReport {
    pub runs: Vec<AgentRun>,
}

impl PhaseReport {
    pub fn fallbacks(&self) -> impl Iterator<Item = &AgentRun> {
        self.runs
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Fallback { .. }))
    }
}

/// A validated, named composition of steps.
#[derive(Clone)]
pub struct Phase {
    name: String,
    steps: Vec<Step>,
}

impl std::fmt::Debug for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Phase")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl Phase {
    /// Validate and build a phase.
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Result<Self, PhaseError> {
        let name = name.into();
        if steps.is_empty() {
            return Err(PhaseError::Empty { phase: name });
        }
        for step in &steps {
            validate_top(&name, step)?;
        }
        Ok(Self { name, steps })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run every step against `ctx`.
    ///
    /// Agent fallbacks are reported and recorded; only a broken write
    /// contract returns `Err`.
    pub async fn run(
        &self,
        ctx: &mut Context,
        sink: &dyn NotificationSink,
    ) -> Result<PhaseReport, PhaseError> {
        let mut report = PhaseReport::default();
        for step in &self.steps {
            match step {
                Step::Parallel(branches) => {
                    let shared: &Context = ctx;
                    let results = join_all(
                        branches.iter().map(|branch| run_branch(branch_agents(branch), shared, sink)),
                    )
                    .await;

                    let mut staged = Vec::new();
                    for result in results {
                        let (values, runs) = result?;
                        staged.extend(values);
                        report.runs.extend(runs);
                    }
                    for value in staged {
                        ctx.apply(value);
                    }
                }
                other => {
                    for agent in branch_agents(other) {
                        let (values, runs) = run_branch(vec![agent], ctx, sink).await?;
                        report.runs.extend(runs);
                        for value in values {
                            ctx.apply(value);
                        }
                    }
                }
            }
        }
        debug!(phase = %self.name, agents = report.runs.len(), "phase complete");
        Ok(report)
    }
}

fn validate_top(phase: &str, step: &Step) -> Result<(), PhaseError> {
    match step {
        Step::Agent(_) => Ok(()),
        Step::Sequence(steps) => {
            if steps.iter().all(|s| matches!(s, Step::Agent(_))) {
                Ok(())
            } else {
                Err(PhaseError::UnsupportedNesting {
                    phase: phase.to_string(),
                })
            }
        }
        Step::Parallel(branches) => {
            let mut claimed = BTreeSet::new();
            for branch in branches {
                match branch {
                    Step::Agent(_) => {}
                    Step::Sequence(inner) if inner.iter().all(|s| matches!(s, Step::Agent(_))) => {}
                    _ => {
                        return Err(PhaseError::UnsupportedNesting {
                            phase: phase.to_string(),
                        })
                    }
                }
                for field in branch.writes() {
                    if !claimed.insert(field) {
                        return Err(PhaseError::overlapping(phase, field));
                    }
                }
            }
            Ok(())
        }
    }
}

/// Agents of a validated branch, in execution order.
fn branch_agents(step: &Step) -> Vec<Arc<dyn Agent>> {
    match step {
        Step::Agent(agent) => vec![Arc::clone(agent)],
        Step::Sequence(steps) | Step::Parallel(steps) => {
            steps.iter().flat_map(branch_agents).collect()
        }
    }
}

/// Run agents in order over `base`, staging their values without applying.
async fn run_branch(
    agents: Vec<Arc<dyn Agent>>,
    base: &Context,
    sink: &dyn NotificationSink,
) -> Result<(Vec<FieldValue>, Vec<AgentRun>), PhaseError> {
    let mut staged: Vec<FieldValue> = Vec::new();
    let mut runs = Vec::with_capacity(agents.len());

    for agent in agents {
        let output = {
            let scope = Scope::new(base, &staged);
            agent.run(&scope).await
        };

        let declared = agent.writes();
        if let Some(bad) = output.values.iter().find(|v| !declared.contains(&v.field())) {
            return Err(PhaseError::UndeclaredWrite {
                agent: agent.name().to_string(),
                field: bad.field().name(),
            });
        }

        report_agent(agent.name(), &output.outcome, &output.values, sink);
        runs.push(AgentRun {
            agent: agent.name(),
            outcome: output.outcome,
        });
        staged.extend(output.values);
    }

    Ok((staged, runs))
}

fn report_agent(
    agent: &'static str,
    outcome: &Outcome,
    values: &[FieldValue],
    sink: &dyn NotificationSink,
) {
    match outcome {
        Outcome::Completed => {
            sink.emit(Notification::new(NotificationKind::Agent, format!("{agent} finished")));
        }
        Outcome::Fallback { reason } => {
            obs::emit_agent_fallback(agent, reason);
            METRICS.inc_agent_fallbacks();
            sink.warning(&format!("{agent} used a fallback: {reason}"));
        }
    }

    let fields: Vec<&str> = values.iter().map(|v| v.field().name()).collect();
    sink.emit(
        Notification::new(NotificationKind::DataUpdate, format!("{agent} updated the project"))
            .with_payload(json!({ "step": agent, "fields": fields })),
    );
}
