//! Run lifecycle: fresh context, graph traversal, compile, persist.
//!
//! A run either reaches `done` and is saved as one [`ProjectRecord`], or it
//! saves nothing. Every abort is logged, counted and reported through the
//! notification sink before the error is returned.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use reel_store::{CompiledBlock, ProjectMetadata, ProjectRecord, ProjectStore};
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use crate::context::{value_str, Context};
use crate::error::{Result, SwarmError};
use crate::graph::{GatePolicy, GraphTrace, NodePhases, RunToken, StopSignal, WorkflowGraph};
use crate::metrics::METRICS;
use crate::notify::NotificationSink;
use crate::obs::{self, RunSpan};
use crate::settings::{ServiceHandles, Settings};

/// Duration recorded for a block without a narration clip.
pub const DEFAULT_BLOCK_SECONDS: f64 = 30.0;

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub record: ProjectRecord,
    pub trace: GraphTrace,
}

/// `proj_<unix-seconds>_<12 hex chars>`.
pub fn new_project_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("proj_{}_{}", Utc::now().timestamp(), &suffix[..12])
}

/// Owns the graph and the stop signal for every run it starts.
pub struct Orchestrator {
    graph: WorkflowGraph,
    stop: StopSignal,
    store: Arc<dyn ProjectStore>,
    sink: Arc<dyn NotificationSink>,
}

impl Orchestrator {
    pub fn new(
        graph: WorkflowGraph,
        store: Arc<dyn ProjectStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            graph,
            stop: StopSignal::new(),
            store,
            sink,
        }
    }

    /// Standard graph wired to `handles`, gated by `settings`.
    pub fn from_handles(
        handles: &ServiceHandles,
        settings: &Settings,
        store: Arc<dyn ProjectStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let phases = NodePhases::standard(Arc::clone(&handles.generator), Arc::clone(&handles.media))?;
        let graph = WorkflowGraph::new(phases, GatePolicy::from_settings(settings));
        Ok(Self::new(graph, store, sink))
    }

    /// Ask in-flight runs to stop at their next node entry.
    pub fn stop(&self) {
        info!("stop requested");
        self.sink.warning("Stop requested; the pipeline halts at the next stage");
        self.stop.stop();
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn store(&self) -> &Arc<dyn ProjectStore> {
        &self.store
    }

    pub fn sink(&self) -> &Arc<dyn NotificationSink> {
        &self.sink
    }

    /// Run the whole pipeline for `niche` and return the saved record.
    pub async fn run_full_pipeline(&self, niche: &str) -> Result<ProjectRecord> {
        Ok(self.run_traced(niche).await?.record)
    }

    /// Like [`run_full_pipeline`](Self::run_full_pipeline), keeping the path taken.
    pub async fn run_traced(&self, niche: &str) -> Result<RunOutcome> {
        self.run(new_project_id(), niche, self.stop.token()).await
    }

    /// Run under an id and stop token chosen by the caller.
    pub async fn run(&self, project_id: String, niche: &str, token: RunToken) -> Result<RunOutcome> {
        let started = Instant::now();
        let mut ctx = Context::new(&project_id, niche);

        obs::emit_run_started(&project_id, niche);
        self.sink
            .info(&format!("Starting pipeline for '{niche}' ({project_id})"));

        let span = RunSpan::new(&project_id, niche);
        let traversal = span
            .instrument(self.graph.run(&mut ctx, &token, self.sink.as_ref()))
            .await;
        let trace = match traversal {
            Ok(trace) => trace,
            Err(e) => return Err(self.abort(&project_id, e)),
        };

        let record = compile_project(&ctx);
        if let Err(e) = self.store.upsert(&record).await {
            return Err(self.abort(&project_id, e.into()));
        }

        METRICS.inc_runs_completed();
        obs::emit_run_finished(
            &project_id,
            started.elapsed().as_millis() as u64,
            trace.visited.len(),
            trace.refine_passes,
        );
        METRICS.flush();
        self.sink
            .success(&format!("Project {project_id} saved with {} blocks", record.script.len()));

        Ok(RunOutcome { record, trace })
    }

    fn abort(&self, project_id: &str, err: SwarmError) -> SwarmError {
        error!(project_id = %project_id, error = %err, "pipeline aborted");
        obs::emit_run_aborted(project_id, &err);
        METRICS.inc_runs_aborted();
        METRICS.flush();
        if err.is_stop() {
            self.sink.warning(&format!("Pipeline {project_id} stopped: {err}"));
        } else {
            self.sink.error(&format!("Pipeline {project_id} failed: {err}"));
        }
        err
    }
}

/// Assemble the output record from a finished context.
///
/// Prompts, images and clips are matched to blocks by position.
pub fn compile_project(ctx: &Context) -> ProjectRecord {
    let topic = ctx.topic();
    let mut record = ProjectRecord::new(&ctx.project_id, &ctx.niche, &topic);

    record.script = ctx
        .final_script
        .iter()
        .enumerate()
        .map(|(i, block)| {
            let clip = ctx.generated_audio.get(i).cloned().flatten();
            CompiledBlock {
                index: i,
                section: block.section.clone(),
                narration: block.narration.clone(),
                visual_prompt: ctx
                    .visual_prompts
                    .get(i)
                    .map(|p| p.prompt.clone())
                    .filter(|p| !p.trim().is_empty()),
                word_count: block.word_count(),
                duration_seconds: clip
                    .as_ref()
                    .map_or(DEFAULT_BLOCK_SECONDS, |c| c.duration_seconds),
                audio_file: clip.map(|c| c.file),
                image_file: ctx.generated_images.get(i).cloned().flatten(),
            }
        })
        .collect();

    let seo = &ctx.seo_package;
    record.metadata = ProjectMetadata {
        title: value_str(seo, &["titles", "primary"])
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&topic)
            .to_string(),
        description: value_str(seo, &["description", "full_description"])
            .or_else(|| value_str(seo, &["description"]))
            .unwrap_or_default()
            .to_string(),
        tags: seo_tags(seo),
        thumbnail_prompt: value_str(&ctx.thumbnail_concept, &["technical_prompt"]).map(str::to_string),
        thumbnail_file: ctx.thumbnail_file.clone(),
    };

    record.trends = ctx.trends.clone();
    record.audience_profile = ctx.audience_profile.clone();
    record.competitor_analysis = ctx.competitor_analysis.clone();
    record.project_bible = ctx.project_bible.clone();
    record.verified_research = ctx.verified_research.clone();
    record.outline = serde_json::to_value(&ctx.outline).unwrap_or(Value::Null);
    record.art_direction = ctx.art_direction.clone();
    record.audio_instructions = ctx.audio_instructions.clone();
    record.seo_package = ctx.seo_package.clone();
    record.audit_report = ctx.audit_report.clone();
    record
}

/// Tags as an array of strings or one comma-separated string.
fn seo_tags(seo: &Value) -> Vec<String> {
    match seo.get("tags") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(list)) => list
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
