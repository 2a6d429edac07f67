//! Classification workflow: pipeline, storage seams, background execution

pub mod pipeline;
pub mod report;
pub mod storage;
pub mod supervisor;

pub use pipeline::{ClassificationPipeline, PipelineConfig};
pub use report::{render_outcome, render_summary};
pub use storage::{AuditSink, MealItemStore, MealStore, SqliteStore};
pub use supervisor::{MealRecorder, TaskSupervisor};
