use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::config::{CameraSetup, IsoViewConfig, PipelineConfig, SweepConfig};
use crate::models::SweepPlan;

/// A generated Fluent journal.
#[derive(Debug, Clone, PartialEq)]
pub struct Journal {
    /// Full file text, starting with the `; <count>` header line
    pub text: String,
    /// Number of statement lines after the header
    pub statement_count: usize,
    pub side_plan: SweepPlan,
    pub front_plan: SweepPlan,
}

impl Journal {
    pub fn write_to(&self, path: &Path) -> Result<(), GeneratorError> {
        fs::write(path, &self.text)
            .map_err(|e| GeneratorError::Io(format!("Failed to write journal {:?}: {}", path, e)))?;
        tracing::info!(
            "Journal written to {:?} ({} statements)",
            path,
            self.statement_count
        );
        Ok(())
    }
}

/// Builds the batch journal the solver executes.
///
/// Statements are collected line by line so the header can carry the exact
/// count the supervisor uses for progress. Comment lines (`;`) are kept for
/// readability but are not statements.
pub struct JournalGenerator {
    lines: Vec<String>,
}

impl JournalGenerator {
    const VELOCITY_FIELD: &'static str = "velocity-magnitude";
    const PRESSURE_FIELD: &'static str = "total-pressure";

    pub fn new() -> Self {
        Self { lines: Vec::new() }
    }

    fn statement(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn comment(&mut self, text: impl AsRef<str>) {
        self.lines.push(format!("; {}", text.as_ref()));
    }

    fn camera(&mut self, camera: &CameraSetup) {
        let [tx, ty, tz] = camera.target;
        let [px, py, pz] = camera.position;
        let [ux, uy, uz] = camera.up_vector;
        self.statement(format!("/views/camera/target {} {} {}", tx, ty, tz));
        self.statement(format!("/views/camera/position {} {} {}", px, py, pz));
        self.statement(format!("/views/camera/up-vector {} {} {}", ux, uy, uz));
        if let Some(zoom) = camera.zoom {
            self.statement(format!("/views/camera/zoom-camera {}", zoom));
        }
    }

    fn iso_view(&mut self, iso: &IsoViewConfig) {
        self.comment("--- Velocity iso-surface seen from below ---");
        self.statement(format!(
            "/display/surface/iso-surface velocity velo_iso () () {} ()",
            iso.iso_value
        ));
        self.statement("/display/set/contours surfaces velo_iso ()");
        self.statement(format!(
            "/display/contour/pressure {} {}",
            iso.pressure_range.0, iso.pressure_range.1
        ));
        self.statement("/views/auto-scale");
        self.camera(&iso.camera);
        self.statement(format!(
            "/display/save-picture \"processed/images/{}\"",
            iso.image_name
        ));
    }

    fn sweep(&mut self, sweep: &SweepConfig, plan: &SweepPlan) {
        self.comment(format!(
            "--- {} sweep: {} planes along {} ---",
            sweep.view,
            plan.len(),
            plan.axis
        ));
        self.statement(format!(
            "/display/display/surface-mesh {} ()",
            sweep.mesh_surface
        ));
        if sweep.auto_scale {
            self.statement("/views/auto-scale");
        }
        self.camera(&sweep.camera);

        for position in &plan.positions {
            self.comment(format!(
                "Image {}/{} at {} = {:.4}",
                position.index + 1,
                plan.len(),
                plan.axis,
                position.offset
            ));
            self.statement(format!(
                "/surface/plane-surface {} {} {:.4}",
                position.plane_name, plan.axis, position.offset
            ));
            self.statement(format!(
                "/display/set/contours surfaces {} ()",
                position.plane_name
            ));
            self.statement(format!(
                "/display/contour/{} {} {}",
                Self::VELOCITY_FIELD,
                sweep.velocity_range.0,
                sweep.velocity_range.1
            ));
            self.statement(format!("/display/save-picture \"{}\"", position.velocity_image));
            self.statement(format!(
                "/display/contour/{} {} {}",
                Self::PRESSURE_FIELD,
                sweep.pressure_range.0,
                sweep.pressure_range.1
            ));
            self.statement(format!("/display/save-picture \"{}\"", position.pressure_image));
            self.statement(format!("/surface/delete {}", position.plane_name));
        }
    }

    pub fn generate_journal(
        mut self,
        case_file: &Path,
        config: &PipelineConfig,
    ) -> Result<Journal, GeneratorError> {
        for sweep in [&config.side_sweep, &config.front_sweep] {
            if sweep.count == 0 {
                return Err(GeneratorError::GenerationError(format!(
                    "{} sweep has no images",
                    sweep.view
                )));
            }
        }

        let side_plan = plan_for(&config.side_sweep);
        let front_plan = plan_for(&config.front_sweep);

        // 1. Case and batch options
        let case_path = case_file.to_string_lossy().replace('\\', "/");
        self.statement(format!("/file/read-case-data \"{}\"", case_path));
        self.statement("/file/set-batch-options no yes yes no");
        self.statement("/display/set-window 1");
        self.statement("/views/camera/projection orthographic");
        self.statement("/views/apply-mirror-planes symmetry ()");

        // 2. Wall-force reports: z normal for downforce, x normal for drag
        self.statement(format!(
            "/report/forces/wall-forces yes 0 0 1 yes {}",
            config.reports.downforce_file
        ));
        self.statement(format!(
            "/report/forces/wall-forces yes 1 0 0 yes {}",
            config.reports.drag_file
        ));

        // 3. Overview image
        if config.iso_view.enabled {
            self.iso_view(&config.iso_view);
        }

        // 4. Sweeps
        self.sweep(&config.side_sweep, &side_plan);
        self.statement("/views/apply-mirror-planes symmetry ()");
        self.sweep(&config.front_sweep, &front_plan);

        self.statement("/exit yes");

        let statement_count = self.lines.iter().filter(|l| is_statement(l)).count();

        let mut text = format!("; {}\n", statement_count);
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }

        Ok(Journal {
            text,
            statement_count,
            side_plan,
            front_plan,
        })
    }
}

impl Default for JournalGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn plan_for(sweep: &SweepConfig) -> SweepPlan {
    SweepPlan::linear(sweep.view, sweep.axis, sweep.start, sweep.end, sweep.count)
}

/// A non-empty line that is not a `;` comment.
pub fn is_statement(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with(';')
}

/// Read the statement count from the first non-empty journal line.
///
/// Accepts an optional leading `;` or `#` comment marker, e.g. `; 2047`.
pub fn parse_statement_count(journal: &str) -> Result<usize, GeneratorError> {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    let header = HEADER.get_or_init(|| {
        Regex::new(r"^\s*[;#]*\s*(\d+)\s*$").expect("journal header pattern is valid")
    });

    let first = journal
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| GeneratorError::InvalidHeader("journal is empty".to_string()))?;

    let count = header
        .captures(first)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .ok_or_else(|| GeneratorError::InvalidHeader(first.trim().to_string()))?;

    if count == 0 {
        return Err(GeneratorError::InvalidHeader(
            "statement count must be positive".to_string(),
        ));
    }
    Ok(count)
}

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("Generation error: {0}")]
    GenerationError(String),
    #[error("Invalid journal header: {0}")]
    InvalidHeader(String),
    #[error("IO error: {0}")]
    Io(String),
}
