//! ReelSwarm - multi-agent video script pipeline CLI
//!
//! The `reelswarm` command runs the pipeline and manages saved projects.
//!
//! ## Commands
//!
//! - `run`: run the whole pipeline for a niche (Ctrl-C stops at the next stage)
//! - `projects`: list, show or delete saved projects
//! - `audit`, `autofix`, `refine`: review and rewrite a saved script
//! - `regen-prompt`, `thumbnail`, `block-image`, `images`, `retry-audio`: redo assets
//! - `edit`: expand or shorten a piece of narration
//! - `settings`: show or initialise the settings file

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reel_store::ProjectRecord;
use reelswarm_core::settings::SETTINGS_FILE;
use reelswarm_core::{
    BroadcastSink, FanoutSink, Notification, NotificationSink, PipelineService, Settings,
    TracingSink,
};
use tokio::sync::broadcast;
use tracing::{info, warn, Level};

/// Notifications buffered for a slow `--follow` reader before it lags.
const LIVE_FEED_CAPACITY: usize = 256;

#[derive(Parser)]
#[command(name = "reelswarm")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-agent video script pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Data directory for projects, media and settings (default: ./data)
    #[arg(long, global = true, env = "REELSWARM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Settings file (default: <data-dir>/settings.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for a niche in the foreground
    Run {
        /// Niche or subject area, e.g. "Ancient Rome"
        niche: String,

        /// Print every pipeline notification to stdout as a JSON line
        #[arg(short, long)]
        follow: bool,
    },

    /// Manage saved projects
    Projects {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Re-run the audit panel on a saved project
    Audit {
        /// Project ID
        id: String,
    },

    /// Rewrite every block from an instruction or the saved audit
    Autofix {
        /// Project ID
        id: String,

        /// Instruction to apply instead of the audit critique
        #[arg(short, long)]
        instruction: Option<String>,
    },

    /// Rewrite one block
    Refine {
        /// Project ID
        id: String,

        /// Block index
        index: usize,

        /// What to change (default: "Improve the wording.")
        #[arg(short, long)]
        instruction: Option<String>,
    },

    /// Write a new visual prompt for one block
    RegenPrompt {
        /// Project ID
        id: String,

        /// Block index
        index: usize,
    },

    /// Render the thumbnail again from its saved prompt
    Thumbnail {
        /// Project ID
        id: String,
    },

    /// Render one block's image again from its saved visual prompt
    BlockImage {
        /// Project ID
        id: String,

        /// Block index
        index: usize,
    },

    /// Render the thumbnail and every block image again
    Images {
        /// Project ID
        id: String,
    },

    /// Synthesize one block's narration again
    RetryAudio {
        /// Project ID
        id: String,

        /// Block index
        index: usize,
    },

    /// Narration text tools
    Edit {
        #[command(subcommand)]
        action: EditAction,
    },

    /// Inspect or create the settings file
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// List saved projects
    List,

    /// Print one project as JSON
    Show {
        /// Project ID
        id: String,
    },

    /// Delete a project
    Delete {
        /// Project ID
        id: String,
    },
}

#[derive(Subcommand)]
enum EditAction {
    /// Expand narration with more detail
    Expand {
        /// Text to expand
        text: String,

        /// Background the new detail should draw on
        #[arg(short, long, default_value = "")]
        context: String,
    },

    /// Shorten narration to about half
    Shorten {
        /// Text to shorten
        text: String,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the effective settings (API key redacted)
    Show,

    /// Write a settings file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    reelswarm_core::init_tracing(cli.json, level);

    let settings_path = settings_path(cli.data_dir.as_deref(), cli.settings.as_deref());

    if let Commands::Settings { action } = &cli.command {
        return match action {
            SettingsAction::Show => {
                let settings = load_settings(&settings_path, cli.data_dir.as_deref())?;
                cmd_settings_show(&settings)
            }
            SettingsAction::Init { force } => cmd_settings_init(&settings_path, *force),
        };
    }

    let settings = load_settings(&settings_path, cli.data_dir.as_deref())?;
    let follow = matches!(cli.command, Commands::Run { follow: true, .. });
    let (sink, feed) = notification_sink(follow);
    let service = PipelineService::from_settings(&settings, sink)
        .context("Failed to build the pipeline service")?;

    match cli.command {
        Commands::Run { niche, .. } => cmd_run(Arc::new(service), &niche, feed).await,
        Commands::Projects { action } => match action {
            ProjectAction::List => cmd_projects_list(&service).await,
            ProjectAction::Show { id } => print_record(&service.get_project(&id).await?),
            ProjectAction::Delete { id } => {
                service.delete_project(&id).await?;
                println!("Deleted {id}");
                Ok(())
            }
        },
        Commands::Audit { id } => {
            let record = service.audit_project(&id).await?;
            print_audit_summary(&record);
            Ok(())
        }
        Commands::Autofix { id, instruction } => {
            let record = service.autofix_project(&id, instruction.as_deref()).await?;
            println!("Auto-fixed {} block(s) of {}", record.script.len(), record.id);
            Ok(())
        }
        Commands::Refine {
            id,
            index,
            instruction,
        } => {
            let record = service.refine_block(&id, index, instruction.as_deref()).await?;
            print_block(&record, index);
            Ok(())
        }
        Commands::RegenPrompt { id, index } => {
            let record = service.regenerate_visual_prompt(&id, index).await?;
            print_block(&record, index);
            Ok(())
        }
        Commands::Thumbnail { id } => {
            let record = service.regenerate_thumbnail(&id).await?;
            println!(
                "Thumbnail: {}",
                record.metadata.thumbnail_file.as_deref().unwrap_or("-")
            );
            Ok(())
        }
        Commands::BlockImage { id, index } => {
            let record = service.regenerate_block_image(&id, index).await?;
            print_block(&record, index);
            Ok(())
        }
        Commands::Images { id } => {
            let record = service.regenerate_all_images(&id).await?;
            let rendered = record.script.iter().filter(|b| b.image_file.is_some()).count();
            println!(
                "Images: {rendered}/{} block(s), thumbnail {}",
                record.script.len(),
                record.metadata.thumbnail_file.as_deref().unwrap_or("-")
            );
            Ok(())
        }
        Commands::RetryAudio { id, index } => {
            let record = service.retry_block_audio(&id, index).await?;
            print_block(&record, index);
            Ok(())
        }
        Commands::Edit { action } => {
            let text = match action {
                EditAction::Expand { text, context } => service.expand_text(&text, &context).await?,
                EditAction::Shorten { text } => service.shorten_text(&text).await?,
            };
            println!("{text}");
            Ok(())
        }
        Commands::Settings { .. } => Ok(()),
    }
}

fn settings_path(data_dir: Option<&Path>, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => data_dir
            .unwrap_or_else(|| Path::new("data"))
            .join(SETTINGS_FILE),
    }
}

/// File values, then environment, then `--data-dir`.
fn load_settings(path: &Path, data_dir: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::load_with_env(path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    if let Some(dir) = data_dir {
        settings.data_dir = dir.to_path_buf();
    }
    Ok(settings)
}

/// Service sink: tracing only, or tracing plus a live feed for `--follow`.
fn notification_sink(
    follow: bool,
) -> (Arc<dyn NotificationSink>, Option<broadcast::Receiver<Notification>>) {
    if !follow {
        return (Arc::new(TracingSink), None);
    }
    let live = BroadcastSink::new(LIVE_FEED_CAPACITY);
    let feed = live.subscribe();
    let sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(TracingSink), Arc::new(live)];
    let sink = FanoutSink::new(sinks);
    (Arc::new(sink), Some(feed))
}

/// Print notifications until every sender is gone.
async fn print_feed(mut feed: broadcast::Receiver<Notification>) {
    loop {
        match feed.recv().await {
            Ok(notification) => match serde_json::to_string(&notification) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "unprintable notification"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "live feed fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Run in the foreground; the first Ctrl-C asks the pipeline to stop.
async fn cmd_run(
    service: Arc<PipelineService>,
    niche: &str,
    feed: Option<broadcast::Receiver<Notification>>,
) -> Result<()> {
    let printer = feed.map(|feed| tokio::spawn(print_feed(feed)));
    let (ack, mut handle) = service.spawn_run(niche);
    println!("{}", serde_json::to_string_pretty(&ack)?);

    let joined = tokio::select! {
        joined = &mut handle => joined,
        _ = tokio::signal::ctrl_c() => {
            warn!(project_id = %ack.project_id, "interrupt received, stopping");
            service.stop();
            handle.await
        }
    };

    // The finished task has released its orchestrator; dropping the service
    // closes the live feed once its backlog is printed.
    drop(service);
    if let Some(printer) = printer {
        printer.await.context("Live feed task panicked")?;
    }

    let outcome = joined
        .context("Pipeline task panicked")?
        .with_context(|| format!("Pipeline {} did not complete", ack.project_id))?;

    info!(
        project_id = %outcome.record.id,
        refine_passes = outcome.trace.refine_passes,
        "pipeline finished"
    );
    let path: Vec<&str> = outcome.trace.visited.iter().map(|n| n.as_str()).collect();
    println!("Path: {}", path.join(" -> "));
    print_audit_summary(&outcome.record);
    println!("Saved {} ({} blocks)", outcome.record.id, outcome.record.script.len());
    Ok(())
}

async fn cmd_projects_list(service: &PipelineService) -> Result<()> {
    let projects = service.list_projects().await?;
    if projects.is_empty() {
        println!("No projects yet");
        return Ok(());
    }
    for record in &projects {
        println!("{}", project_line(record));
    }
    Ok(())
}

fn project_line(record: &ProjectRecord) -> String {
    let score = record
        .audit_report
        .as_ref()
        .map(|r| format!("{:.1}", r.global_score))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}  {:<10}  {:>4}  {:>6.0}s  {}",
        record.id,
        record.status.to_string(),
        score,
        record.total_duration(),
        record.metadata.title
    )
}

fn print_record(record: &ProjectRecord) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}

fn print_audit_summary(record: &ProjectRecord) {
    let Some(report) = &record.audit_report else {
        println!("No audit report");
        return;
    };
    println!(
        "Score: {:.1}/10 ({})",
        report.global_score, report.global_verdict
    );
    for auditor in &report.auditors {
        match &auditor.error {
            Some(err) => println!("  {} {}: failed ({err})", auditor.icon, auditor.auditor),
            None => println!("  {} {}: {:.1}", auditor.icon, auditor.auditor, auditor.score),
        }
    }
    for issue in &report.top_issues {
        println!("  - [{}] {}", issue.auditor, issue.issue);
    }
}

fn print_block(record: &ProjectRecord, index: usize) {
    match record.script.iter().find(|b| b.index == index) {
        Some(block) => {
            println!("[{}] {}", block.section, block.narration);
            if let Some(prompt) = &block.visual_prompt {
                println!("Visual: {prompt}");
            }
            if let Some(image) = &block.image_file {
                println!("Image: {image}");
            }
            if let Some(audio) = &block.audio_file {
                println!("Audio: {audio} ({:.1}s)", block.duration_seconds);
            }
        }
        None => println!("Block {index} not found in {}", record.id),
    }
}

fn cmd_settings_show(settings: &Settings) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&settings.redacted())?);
    Ok(())
}

fn cmd_settings_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    Settings::default()
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default settings to {}", path.display());
    Ok(())
}
