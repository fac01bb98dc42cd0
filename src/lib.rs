//! Fluent post-processing - batch automation around an external CFD solver
//!
//! For one case folder the pipeline:
//! - generates a journal that sweeps clipping planes along the side and
//!   front of the car and saves velocity and pressure contour images
//! - runs the solver in batch mode on that journal, streaming its output
//!   into percentage progress, with a timeout and cancellation
//! - moves the two wall-force reports into `processed/forces` and pulls the
//!   per-component totals out of them
//! - fills a copy of the versioned force sheet with the nine summary values
//!
//! ## Example
//! ```no_run
//! use fluent_postproc::prelude::*;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn demo() -> PipelineResult<()> {
//! let config = Arc::new(PipelineConfig::load(None)?);
//! let processor = PostProcessor::new(config);
//! let cancel = CancellationToken::new();
//! let outcome = processor
//!     .run(Path::new("cases/run_42"), &|p: u8| println!("{}%", p), &|_: RunStage| {}, &cancel)
//!     .await?;
//! println!("drag: {}", outcome.summary.drag_net);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod generator;
pub mod layout;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod template;
pub mod viewer;

// Re-export common types
pub mod prelude {
    pub use crate::config::{PipelineConfig, ReportConfig, SolverConfig, SweepConfig, TemplateConfig};
    pub use crate::error::{PipelineError, PipelineResult};
    pub use crate::executor::{ExecutorError, SolverSupervisor};
    pub use crate::extractor::ReportExtractor;
    pub use crate::generator::JournalGenerator;
    pub use crate::layout::{CaseFolder, OutputLayout};
    pub use crate::models::{
        ForceReport, ForceSummary, PipelineOutcome, RunSnapshot, RunStage, RunStatus, SeriesKind, SweepPlan,
    };
    pub use crate::pipeline::{PostProcessor, StageObserver};
    pub use crate::progress::{CancellationToken, ProgressReporter, RunEvent};
    pub use crate::session::PostProcessingSession;
    pub use crate::template::TemplateWriter;
    pub use crate::viewer::{ImageSeries, SeriesCursor};
}
