//! The produced surface: start and stop runs, read and edit saved projects.
//!
//! Every edit loads a record, changes it, and writes it back whole.

use std::sync::Arc;

use reel_store::{JsonFileStore, ProjectRecord, ProjectStatus, ProjectStore};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::agents::{critique_from_panel, Editor};
use crate::audit::AuditPanel;
use crate::context::{Context, ScriptBlock};
use crate::error::{Result, SwarmError};
use crate::notify::NotificationSink;
use crate::orchestrator::{new_project_id, Orchestrator, RunOutcome};
use crate::settings::{ServiceHandles, Settings};

/// Instruction used by [`PipelineService::refine_block`] when none is given.
pub const DEFAULT_BLOCK_INSTRUCTION: &str = "Improve the wording.";

/// Returned by [`PipelineService::start`] before the run does any work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartAck {
    pub status: &'static str,
    pub project_id: String,
    pub niche: String,
}

pub struct PipelineService {
    orchestrator: Arc<Orchestrator>,
    handles: ServiceHandles,
    editor: Editor,
    panel: AuditPanel,
}

impl PipelineService {
    pub fn new(orchestrator: Orchestrator, handles: ServiceHandles) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            editor: Editor::new(Arc::clone(&handles.generator)),
            panel: AuditPanel::standard(Arc::clone(&handles.generator)),
            handles,
        }
    }

    /// Gemini handles and a JSON store under `settings.data_dir`.
    pub fn from_settings(settings: &Settings, sink: Arc<dyn NotificationSink>) -> Result<Self> {
        let handles = ServiceHandles::from_settings(settings)?;
        let store: Arc<dyn ProjectStore> = Arc::new(JsonFileStore::in_dir(&settings.data_dir));
        let orchestrator = Orchestrator::from_handles(&handles, settings, store, sink)?;
        Ok(Self::new(orchestrator, handles))
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    fn store(&self) -> &Arc<dyn ProjectStore> {
        self.orchestrator.store()
    }

    fn sink(&self) -> &Arc<dyn NotificationSink> {
        self.orchestrator.sink()
    }

    /// Start a run in the background and acknowledge at once.
    pub fn start(&self, niche: &str) -> StartAck {
        let (ack, _handle) = self.spawn_run(niche);
        ack
    }

    /// [`start`](Self::start), also returning the task so callers can await it.
    ///
    /// The stop token is taken before spawning, so a `stop()` issued right
    /// after this returns still reaches the run.
    pub fn spawn_run(&self, niche: &str) -> (StartAck, JoinHandle<Result<RunOutcome>>) {
        let project_id = new_project_id();
        let token = self.orchestrator.stop_signal().token();
        let orchestrator = Arc::clone(&self.orchestrator);
        let task_id = project_id.clone();
        let task_niche = niche.to_string();

        let handle = tokio::spawn(async move { orchestrator.run(task_id, &task_niche, token).await });

        info!(project_id = %project_id, niche = %niche, "pipeline started");
        let ack = StartAck {
            status: "started",
            project_id,
            niche: niche.to_string(),
        };
        (ack, handle)
    }

    pub fn stop(&self) {
        self.orchestrator.stop();
    }

    pub async fn list_projects(&self) -> Result<Vec<ProjectRecord>> {
        Ok(self.store().list_all().await?)
    }

    pub async fn get_project(&self, id: &str) -> Result<ProjectRecord> {
        self.store()
            .get(id)
            .await?
            .ok_or_else(|| SwarmError::ProjectNotFound(id.to_string()))
    }

    pub async fn delete_project(&self, id: &str) -> Result<()> {
        if self.store().delete(id).await? {
            info!(project_id = %id, "project deleted");
            Ok(())
        } else {
            Err(SwarmError::ProjectNotFound(id.to_string()))
        }
    }

    async fn save(&self, mut record: ProjectRecord, status: ProjectStatus) -> Result<ProjectRecord> {
        record.touch(status);
        self.store().upsert(&record).await?;
        Ok(record)
    }

    /// Re-run the audit panel on a saved script.
    #[instrument(skip(self))]
    pub async fn audit_project(&self, id: &str) -> Result<ProjectRecord> {
        let mut record = self.get_project(id).await?;
        let blocks = Context::from_record(&record).final_script;
        let report = self.panel.audit(&record.topic, &record.niche, &blocks).await;

        self.sink().info(&format!(
            "Audit of {id}: {:.1}/10 ({})",
            report.global_score, report.global_verdict
        ));
        record.audit_report = Some(report);
        self.save(record, ProjectStatus::Audited).await
    }

    /// Rewrite every block with `instruction`, or with the saved panel critique.
    #[instrument(skip(self, instruction))]
    pub async fn autofix_project(&self, id: &str, instruction: Option<&str>) -> Result<ProjectRecord> {
        let mut record = self.get_project(id).await?;
        let critique = match instruction.map(str::trim).filter(|i| !i.is_empty()) {
            Some(text) => text.to_string(),
            None => record
                .audit_report
                .as_ref()
                .and_then(critique_from_panel)
                .ok_or_else(|| {
                    SwarmError::MissingInput(format!("project {id} has no instruction or audit issues"))
                })?,
        };

        let blocks = Context::from_record(&record).final_script;
        let (refined, failed) = self.editor.refine_blocks(&blocks, &critique).await;
        if failed > 0 {
            warn!(project_id = %id, failed, "some blocks kept their text");
            self.sink()
                .warning(&format!("Auto-fix left {failed} block(s) of {id} unchanged"));
        }
        for (compiled, block) in record.script.iter_mut().zip(refined) {
            compiled.word_count = block.word_count();
            compiled.narration = block.narration;
        }
        self.save(record, ProjectStatus::AutoFixed).await
    }

    fn block_position(record: &ProjectRecord, index: usize) -> Result<usize> {
        record
            .script
            .iter()
            .position(|b| b.index == index)
            .ok_or_else(|| SwarmError::BlockNotFound {
                project: record.id.clone(),
                index,
            })
    }

    /// Rewrite one block.
    #[instrument(skip(self, instruction))]
    pub async fn refine_block(
        &self,
        id: &str,
        index: usize,
        instruction: Option<&str>,
    ) -> Result<ProjectRecord> {
        let mut record = self.get_project(id).await?;
        let pos = Self::block_position(&record, index)?;
        let instruction = instruction
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .unwrap_or(DEFAULT_BLOCK_INSTRUCTION);

        let text = self
            .editor
            .refine_text(&record.script[pos].narration, instruction)
            .await?;
        let block = &mut record.script[pos];
        block.word_count = text.split_whitespace().count();
        block.narration = text;
        self.save(record, ProjectStatus::Edited).await
    }

    /// Write a new image prompt for one block.
    #[instrument(skip(self))]
    pub async fn regenerate_visual_prompt(&self, id: &str, index: usize) -> Result<ProjectRecord> {
        let mut record = self.get_project(id).await?;
        let pos = Self::block_position(&record, index)?;
        let block = &record.script[pos];
        let source = ScriptBlock::new(block.index, block.section.clone(), block.narration.clone());

        let prompt = self
            .editor
            .regenerate_visual_prompt(&source, &record.art_direction)
            .await?;
        record.script[pos].visual_prompt = Some(prompt);
        self.save(record, ProjectStatus::Edited).await
    }

    /// Render the thumbnail again from the saved prompt.
    #[instrument(skip(self))]
    pub async fn regenerate_thumbnail(&self, id: &str) -> Result<ProjectRecord> {
        let mut record = self.get_project(id).await?;
        let prompt = record
            .metadata
            .thumbnail_prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| SwarmError::MissingInput(format!("project {id} has no thumbnail prompt")))?;

        let file = self.handles.media.render_image(&prompt, id, "thumbnail").await?;
        record.metadata.thumbnail_file = Some(file);
        self.save(record, ProjectStatus::Edited).await
    }

    /// Render one block's image again from its saved visual prompt.
    #[instrument(skip(self))]
    pub async fn regenerate_block_image(&self, id: &str, index: usize) -> Result<ProjectRecord> {
        let mut record = self.get_project(id).await?;
        let pos = Self::block_position(&record, index)?;
        let prompt = record.script[pos]
            .visual_prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| SwarmError::MissingInput(format!("block {index} of {id} has no visual prompt")))?;

        let file = self
            .handles
            .media
            .render_image(&prompt, id, &format!("img_{pos}"))
            .await?;
        record.script[pos].image_file = Some(file);
        self.save(record, ProjectStatus::Edited).await
    }

    /// Render the thumbnail and every block image again, then save once.
    ///
    /// Items without a prompt are skipped. A failed item keeps its previous
    /// file and is reported as a warning.
    #[instrument(skip(self))]
    pub async fn regenerate_all_images(&self, id: &str) -> Result<ProjectRecord> {
        let mut record = self.get_project(id).await?;
        let mut failed = 0;

        if let Some(prompt) = record
            .metadata
            .thumbnail_prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
        {
            match self.handles.media.render_image(&prompt, id, "thumbnail").await {
                Ok(file) => record.metadata.thumbnail_file = Some(file),
                Err(e) => {
                    warn!(project_id = %id, error = %e, "thumbnail render failed");
                    failed += 1;
                }
            }
        }

        for (pos, block) in record.script.iter_mut().enumerate() {
            let Some(prompt) = block.visual_prompt.clone().filter(|p| !p.trim().is_empty()) else {
                continue;
            };
            match self
                .handles
                .media
                .render_image(&prompt, id, &format!("img_{pos}"))
                .await
            {
                Ok(file) => block.image_file = Some(file),
                Err(e) => {
                    warn!(project_id = %id, index = block.index, error = %e, "image render failed");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            self.sink()
                .warning(&format!("{failed} image(s) of {id} kept their previous file"));
        }
        self.save(record, ProjectStatus::Edited).await
    }

    /// Synthesize one block's narration again.
    #[instrument(skip(self))]
    pub async fn retry_block_audio(&self, id: &str, index: usize) -> Result<ProjectRecord> {
        let mut record = self.get_project(id).await?;
        let pos = Self::block_position(&record, index)?;
        let narration = record.script[pos].narration.clone();
        if narration.trim().is_empty() {
            return Err(SwarmError::MissingInput(format!("block {index} of {id} has no narration")));
        }

        let clip = self.handles.media.synthesize_speech(&narration, id, pos).await?;
        let block = &mut record.script[pos];
        block.duration_seconds = clip.duration_seconds;
        block.audio_file = Some(clip.file);
        self.save(record, ProjectStatus::Edited).await
    }

    pub async fn expand_text(&self, text: &str, context: &str) -> Result<String> {
        Ok(self.editor.expand_text(text, context).await?)
    }

    pub async fn shorten_text(&self, text: &str) -> Result<String> {
        Ok(self.editor.shorten_text(text).await?)
    }
}
