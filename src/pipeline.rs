use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::executor::SolverSupervisor;
use crate::extractor::ReportExtractor;
use crate::generator::JournalGenerator;
use crate::layout::{CaseFolder, OutputLayout};
use crate::models::{PipelineOutcome, RunStage};
use crate::progress::{CancellationToken, ProgressReporter};
use crate::template::TemplateWriter;

/// Receives coarse stage changes during a run.
pub trait StageObserver: Send + Sync {
    fn on_stage(&self, stage: RunStage);
}

impl<F> StageObserver for F
where
    F: Fn(RunStage) + Send + Sync,
{
    fn on_stage(&self, stage: RunStage) {
        self(stage)
    }
}

/// Runs journal generation, the solver, report extraction and the template
/// write for one case folder, strictly in that order.
pub struct PostProcessor {
    config: Arc<PipelineConfig>,
    solver_override: Option<PathBuf>,
}

impl PostProcessor {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self {
            config,
            solver_override: None,
        }
    }

    /// Run a specific solver executable instead of the configured one.
    pub fn with_solver(mut self, executable: impl Into<PathBuf>) -> Self {
        self.solver_override = Some(executable.into());
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate the case folder and template before any expensive work.
    pub fn prepare(&self, case_folder: &Path) -> PipelineResult<(CaseFolder, OutputLayout)> {
        self.config.validate()?;
        let case = CaseFolder::locate(case_folder)?;
        TemplateWriter::new(&self.config.template).verify_master()?;
        let layout = OutputLayout::create(&case)?;
        Ok((case, layout))
    }

    /// Run the whole post-processing chain for `case_folder`.
    pub async fn run(
        &self,
        case_folder: &Path,
        reporter: &dyn ProgressReporter,
        stages: &dyn StageObserver,
        cancel: &CancellationToken,
    ) -> PipelineResult<PipelineOutcome> {
        stages.on_stage(RunStage::PreparingLayout);
        let (case, layout) = self.prepare(case_folder)?;
        tracing::info!("Post-processing {:?}", case.root());

        stages.on_stage(RunStage::WritingJournal);
        let journal = JournalGenerator::new().generate_journal(case.case_file(), &self.config)?;
        let journal_path = layout.out_dir.join(&self.config.journal_file_name);
        journal.write_to(&journal_path)?;

        stages.on_stage(RunStage::RunningSolver);
        let mut supervisor = SolverSupervisor::new(&self.config.solver);
        if let Some(exe) = &self.solver_override {
            supervisor = supervisor.with_executable(exe.clone());
        }
        let solver_run = supervisor
            .run(&journal_path, case.root(), &layout.out_dir, reporter, cancel)
            .await?;

        stages.on_stage(RunStage::ExtractingForces);
        let extractor = ReportExtractor::new(&self.config.reports);
        let collected = extractor.collect_reports(case.root(), &layout.forces_dir)?;
        let report = extractor.extract(&collected)?;
        let summary = extractor.summarize(&report);

        stages.on_stage(RunStage::WritingTemplate);
        let workbook = if collected.drag.is_none() && collected.downforce.is_none() {
            tracing::warn!("No force reports found, force sheet not written");
            None
        } else {
            Some(TemplateWriter::new(&self.config.template).write(&summary, &layout.forces_dir)?)
        };

        stages.on_stage(RunStage::Completed);
        Ok(PipelineOutcome {
            output_dir: solver_run.output_dir,
            summary,
            workbook,
            missing_reports: collected.missing,
        })
    }
}
