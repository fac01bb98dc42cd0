//! Error types for the post-processing pipeline

use thiserror::Error;

use crate::config::ConfigError;
use crate::executor::ExecutorError;
use crate::extractor::ReportError;
use crate::generator::GeneratorError;
use crate::layout::LayoutError;
use crate::template::TemplateError;

/// Any failure that stops a post-processing run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Case folder error: {0}")]
    Layout(#[from] LayoutError),

    #[error("Journal error: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Solver error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("A run is already active for {0}")]
    RunInProgress(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PipelineError {
    /// Configuration and template problems are caller errors; the rest are run failures.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PipelineError::Config(_)
                | PipelineError::Layout(LayoutError::NoCaseFile(_))
                | PipelineError::Layout(LayoutError::AmbiguousCaseFile { .. })
                | PipelineError::Layout(LayoutError::NotADirectory(_))
                | PipelineError::Template(TemplateError::VersionMismatch { .. })
                | PipelineError::Template(TemplateError::MissingTemplate(_))
                | PipelineError::Template(TemplateError::ShapeMismatch { .. })
        )
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
