use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::{ComponentRows, SweepAxis, SweepView};

/// Full configuration for one post-processing pipeline.
///
/// Built once at startup and shared read-only (`Arc<PipelineConfig>`) between
/// the script generator, the supervisor, the report extractor and the
/// template writer. The template mapping is versioned together with
/// `template.expected_version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub solver: SolverConfig,
    pub side_sweep: SweepConfig,
    pub front_sweep: SweepConfig,
    pub iso_view: IsoViewConfig,
    pub reports: ReportConfig,
    pub template: TemplateConfig,
    /// Journal file name, written into `<case>/processed/`
    pub journal_file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub executable: PathBuf,
    /// Solver dimension argument ("3d", "3ddp", ...)
    pub dimension: String,
    pub threads: u32,
    pub hide_gui: bool,
    pub timeout_secs: u64,
    /// How often the watchdog checks timeout and cancellation when the solver is silent
    pub watchdog_tick_ms: u64,
    /// Time left for buffered output after the solver exits while a child
    /// process still holds its pipes
    pub drain_grace_ms: u64,
}

/// Camera placement emitted before a sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSetup {
    pub target: [f64; 3],
    pub position: [f64; 3],
    pub up_vector: [f64; 3],
    pub zoom: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    pub view: SweepView,
    pub axis: SweepAxis,
    pub start: f64,
    pub end: f64,
    pub count: usize,
    pub velocity_range: (f64, f64),
    pub pressure_range: (f64, f64),
    /// Surface whose mesh is displayed behind the contours
    pub mesh_surface: String,
    /// Auto-scale the view before placing the camera
    #[serde(default)]
    pub auto_scale: bool,
    pub camera: CameraSetup,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IsoViewConfig {
    pub enabled: bool,
    pub iso_value: f64,
    pub pressure_range: (f64, f64),
    pub camera: CameraSetup,
    pub image_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Wall-force report along the x direction
    pub drag_file: String,
    /// Wall-force report along the z direction
    pub downforce_file: String,
    pub header_lines: usize,
    pub total_column: String,
    pub rows: ComponentRows,
    /// Downforce report row used for the moment about the front axis; `None` writes 0.0
    pub moment_row: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub master: PathBuf,
    pub sheet_index: usize,
    /// 1-based (row, column) of the version marker
    pub marker_row: u32,
    pub marker_column: u32,
    pub expected_version: String,
    /// 1-based destination rows, in `ForceSummary` order
    pub rows: Vec<u32>,
    /// 1-based destination columns, in `ForceSummary` order
    pub columns: Vec<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            side_sweep: SweepConfig::side(),
            front_sweep: SweepConfig::front(),
            iso_view: IsoViewConfig::default(),
            reports: ReportConfig::default(),
            template: TemplateConfig::default(),
            journal_file_name: "v0.1_sequence.jou".to_string(),
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("fluent"),
            dimension: "3d".to_string(),
            threads: 8,
            hide_gui: true,
            timeout_secs: 2000,
            watchdog_tick_ms: 250,
            drain_grace_ms: 500,
        }
    }
}

impl SweepConfig {
    /// Side images: planes along z, from the symmetry plane outwards.
    pub fn side() -> Self {
        Self {
            view: SweepView::Side,
            axis: SweepAxis::Z,
            start: 0.0,
            end: 0.760,
            count: 30,
            velocity_range: (0.0, 35.0),
            pressure_range: (-300.0, 350.0),
            mesh_surface: "symmetry".to_string(),
            auto_scale: false,
            camera: CameraSetup {
                target: [0.4, 0.0, 1.0],
                position: [0.4, 1.0, 1.0],
                up_vector: [0.0, 0.0, 1.0],
                zoom: None,
            },
        }
    }

    /// Front images: planes along y, nose to tail.
    pub fn front() -> Self {
        Self {
            view: SweepView::Front,
            axis: SweepAxis::Y,
            start: -1.250,
            end: 1.850,
            count: 45,
            velocity_range: (0.0, 35.0),
            pressure_range: (-300.0, 300.0),
            mesh_surface: "inlet".to_string(),
            auto_scale: true,
            camera: CameraSetup {
                target: [0.0, 0.0, 0.8],
                position: [1.0, 0.0, 0.8],
                up_vector: [0.0, 0.0, 1.0],
                zoom: Some(4.0),
            },
        }
    }
}

impl Default for IsoViewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            iso_value: 5.0,
            pressure_range: (-600.0, 100.0),
            camera: CameraSetup {
                target: [0.5, 0.1, 0.0],
                position: [0.5, 0.1, -1.0],
                up_vector: [0.0, 1.0, 0.0],
                zoom: Some(1.5),
            },
            image_name: "bottom_iso.png".to_string(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            drag_file: "drag.csv".to_string(),
            downforce_file: "df.csv".to_string(),
            header_lines: 19,
            total_column: "Total".to_string(),
            rows: ComponentRows::default(),
            moment_row: None,
        }
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            master: PathBuf::from("data/aero force sheet.xlsx"),
            sheet_index: 0,
            marker_row: 1,
            marker_column: 1,
            expected_version: "v1.0".to_string(),
            rows: vec![11, 12, 13, 15, 11, 12, 13, 15, 18],
            columns: vec![3, 3, 3, 3, 8, 8, 8, 8, 8],
        }
    }
}

impl TemplateConfig {
    /// File name the template keeps once copied into the forces directory.
    pub fn file_name(&self) -> String {
        self.master
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "force sheet.xlsx".to_string())
    }
}

impl PipelineConfig {
    /// Load configuration from an optional JSON file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?
            }
            None => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(exe) = std::env::var("FLUENT_PATH") {
            self.solver.executable = PathBuf::from(exe);
        }
        if let Ok(secs) = std::env::var("FLUENT_TIMEOUT_SECS") {
            self.solver.timeout_secs = secs
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("FLUENT_TIMEOUT_SECS is not a number: {}", secs)))?;
        }
        if let Ok(template) = std::env::var("POSTPROC_TEMPLATE") {
            self.template.master = PathBuf::from(template);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for sweep in [&self.side_sweep, &self.front_sweep] {
            if sweep.count == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{} sweep needs at least one image",
                    sweep.view
                )));
            }
            if !sweep.start.is_finite() || !sweep.end.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "{} sweep bounds must be finite",
                    sweep.view
                )));
            }
        }
        if self.solver.threads == 0 {
            return Err(ConfigError::Invalid("solver needs at least one thread".to_string()));
        }
        if self.solver.timeout_secs == 0 {
            return Err(ConfigError::Invalid("solver timeout must be positive".to_string()));
        }
        if self.template.rows.len() != crate::models::FORCE_SUMMARY_LEN
            || self.template.columns.len() != crate::models::FORCE_SUMMARY_LEN
        {
            return Err(ConfigError::Invalid(format!(
                "template mapping needs {} rows and columns, got {} rows and {} columns",
                crate::models::FORCE_SUMMARY_LEN,
                self.template.rows.len(),
                self.template.columns.len()
            )));
        }
        if self.template.rows.iter().chain(&self.template.columns).any(|&i| i == 0) {
            return Err(ConfigError::Invalid("template rows and columns are 1-based".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.side_sweep.count, 30);
        assert_eq!(config.front_sweep.count, 45);
        assert_eq!(config.template.file_name(), "aero force sheet.xlsx");
    }

    #[test]
    fn test_zero_image_count_rejected() {
        let mut config = PipelineConfig::default();
        config.front_sweep.count = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_template_shape_checked() {
        let mut config = PipelineConfig::default();
        config.template.columns.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "solver": { "threads": 4 }, "journal_file_name": "x.jou" }"#).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let config: PipelineConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(config.solver.threads, 4);
        assert_eq!(config.solver.timeout_secs, 2000);
        assert_eq!(config.journal_file_name, "x.jou");
        assert_eq!(config.reports.header_lines, 19);
    }
}
