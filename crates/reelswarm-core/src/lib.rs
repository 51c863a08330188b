//! ReelSwarm Core Library
//!
//! Orchestration core of the ReelSwarm video-script pipeline: the shared
//! [`Context`], the agent contract, phases, the audit panel, the workflow
//! graph with its quality gate, and the orchestrator that compiles and
//! persists a finished run.

pub mod agent;
pub mod agents;
pub mod audit;
pub mod context;
pub mod error;
pub mod fakes;
pub mod graph;
pub mod metrics;
pub mod notify;
pub mod obs;
pub mod orchestrator;
pub mod phase;
pub mod provider;
pub mod service;
pub mod settings;
pub mod telemetry;

pub use agent::{Agent, AgentFailure, AgentOutput, Outcome};
pub use audit::{default_panel, reduce_reports, AuditPanel, AuditorSpec, SpecialistAuditor};
pub use context::{
    Context, ContextField, FieldValue, OutlineEntry, Scope, ScriptBlock, SpeechClip, VisualPrompt,
};
pub use error::{PhaseError, Result, SwarmError};
pub use graph::{
    decide, GateDecision, GatePolicy, GraphTrace, Node, NodePhases, RunToken, StopSignal,
    WorkflowGraph,
};
pub use metrics::METRICS;
pub use notify::{
    BroadcastSink, FanoutSink, Notification, NotificationKind, NotificationSink, TracingSink,
};
pub use orchestrator::{compile_project, new_project_id, Orchestrator, RunOutcome};
pub use phase::{AgentRun, Phase, PhaseReport, Step};
pub use provider::{
    GeminiClient, GeminiMedia, GenerationRequest, Generator, MediaSynthesizer, ProviderError,
    RetryPolicy, RetryingGenerator,
};
pub use service::{PipelineService, StartAck};
pub use settings::{ServiceHandles, Settings};
pub use telemetry::init_tracing;

pub use reel_store::{AuditReport, AuditorReport, ProjectRecord, ProjectStatus, ProjectStore};
