//! Concrete pipeline agents, grouped by department.

pub mod assets;
pub mod editor;
pub mod media;
pub mod narrative;
pub mod research;
pub mod strategy;

pub use assets::{ArtDirector, AudioDirector, PromptEngineer, SeoOptimizer, ThumbnailStrategist};
pub use editor::{critique_from_issues, critique_from_panel, Editor, ScriptRefiner};
pub use media::{ImageRenderer, Narrator, ThumbnailRenderer};
pub use narrative::{ComedySpecialist, HookMaster, LeadWriter, ScriptArchitect};
pub use research::{DeepResearcher, FactChecker, InvestigativeJournalist};
pub use strategy::{AudienceProfiler, CompetitorAnalyst, ProjectManager, TrendHunter};
