use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Number of quantities written into the force sheet.
pub const FORCE_SUMMARY_LEN: usize = 9;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SweepAxis {
    X,
    Y,
    Z,
}

impl fmt::Display for SweepAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SweepAxis::X => "x",
            SweepAxis::Y => "y",
            SweepAxis::Z => "z",
        };
        f.write_str(name)
    }
}

/// Which camera view a sweep renders; selects the image directories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SweepView {
    Side,
    Front,
}

impl SweepView {
    pub fn velocity_series(self) -> SeriesKind {
        match self {
            SweepView::Side => SeriesKind::SideVel,
            SweepView::Front => SeriesKind::FrontVel,
        }
    }

    pub fn pressure_series(self) -> SeriesKind {
        match self {
            SweepView::Side => SeriesKind::SidePressure,
            SweepView::Front => SeriesKind::FrontPressure,
        }
    }
}

impl fmt::Display for SweepView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepView::Side => f.write_str("side"),
            SweepView::Front => f.write_str("front"),
        }
    }
}

/// One of the four image sequences produced by the sweeps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    FrontVel,
    FrontPressure,
    SideVel,
    SidePressure,
}

impl SeriesKind {
    pub const ALL: [SeriesKind; 4] = [
        SeriesKind::FrontVel,
        SeriesKind::FrontPressure,
        SeriesKind::SideVel,
        SeriesKind::SidePressure,
    ];

    /// Directory name under `processed/images`, also the image file prefix.
    pub fn dir_name(self) -> &'static str {
        match self {
            SeriesKind::FrontVel => "front_vel",
            SeriesKind::FrontPressure => "front_pressure",
            SeriesKind::SideVel => "side_vel",
            SeriesKind::SidePressure => "side_pressure",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.dir_name() == name)
    }

    /// Image path relative to the case folder, e.g. `processed/images/side_vel/side_vel_00.png`.
    pub fn image_path(self, index: usize) -> String {
        format!(
            "processed/images/{dir}/{dir}_{index:02}.png",
            dir = self.dir_name(),
            index = index
        )
    }
}

/// A single clipping plane of a sweep and the two images rendered on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPosition {
    pub index: usize,
    pub offset: f64,
    pub plane_name: String,
    pub velocity_image: String,
    pub pressure_image: String,
}

/// Ordered plane positions along one axis. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPlan {
    pub view: SweepView,
    pub axis: SweepAxis,
    pub positions: Vec<SweepPosition>,
}

impl SweepPlan {
    /// Evenly spaced planes from `start` to `end` inclusive.
    pub fn linear(view: SweepView, axis: SweepAxis, start: f64, end: f64, count: usize) -> Self {
        let step = if count > 1 {
            (end - start) / (count - 1) as f64
        } else {
            0.0
        };

        let positions = (0..count)
            .map(|index| SweepPosition {
                index,
                offset: start + step * index as f64,
                plane_name: format!("plane_{}_{:02}", axis, index),
                velocity_image: view.velocity_series().image_path(index),
                pressure_image: view.pressure_series().image_path(index),
            })
            .collect();

        Self {
            view,
            axis,
            positions,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Named car components reported as wall-force rows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Component {
    Chassis,
    FrontWheel,
    FrontWing,
    RearWheel,
    RearWing,
    Sidepod,
}

impl Component {
    pub const ALL: [Component; 6] = [
        Component::Chassis,
        Component::FrontWheel,
        Component::FrontWing,
        Component::RearWheel,
        Component::RearWing,
        Component::Sidepod,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Component::Chassis => "chassis",
            Component::FrontWheel => "front-wheel",
            Component::FrontWing => "front-wing",
            Component::RearWheel => "rear-wheel",
            Component::RearWing => "rear-wing",
            Component::Sidepod => "sidepod",
        }
    }
}

/// Component name to report row index (0-based data rows after the header).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ComponentRows {
    pub chassis: usize,
    pub front_wheel: usize,
    pub front_wing: usize,
    pub rear_wheel: usize,
    pub rear_wing: usize,
    pub sidepod: usize,
}

impl Default for ComponentRows {
    fn default() -> Self {
        Self {
            chassis: 1,
            front_wheel: 3,
            front_wing: 4,
            rear_wheel: 5,
            rear_wing: 6,
            sidepod: 8,
        }
    }
}

impl ComponentRows {
    pub fn row(&self, component: Component) -> usize {
        match component {
            Component::Chassis => self.chassis,
            Component::FrontWheel => self.front_wheel,
            Component::FrontWing => self.front_wing,
            Component::RearWheel => self.rear_wheel,
            Component::RearWing => self.rear_wing,
            Component::Sidepod => self.sidepod,
        }
    }

    pub fn max_row(&self) -> usize {
        Component::ALL
            .iter()
            .map(|&c| self.row(c))
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Quantity {
    Drag,
    Downforce,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Drag => f.write_str("drag"),
            Quantity::Downforce => f.write_str("downforce"),
        }
    }
}

/// "Total" column of one wall-force report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityReport {
    pub quantity: Quantity,
    /// One entry per data row; non-numeric cells are NaN
    pub totals: Vec<f64>,
}

impl QuantityReport {
    pub fn component(&self, rows: &ComponentRows, component: Component) -> f64 {
        self.totals
            .get(rows.row(component))
            .copied()
            .unwrap_or(f64::NAN)
    }

    /// Sum of the six named components.
    pub fn net(&self, rows: &ComponentRows) -> f64 {
        Component::ALL
            .iter()
            .map(|&c| self.component(rows, c))
            .sum()
    }
}

/// Parsed reports for one run. A quantity is `None` when its report file was missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForceReport {
    pub drag: Option<QuantityReport>,
    pub downforce: Option<QuantityReport>,
}

/// The nine values written into the force sheet, in sheet order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForceSummary {
    pub drag_front_wing: f64,
    pub drag_sidepod: f64,
    pub drag_rear_wing: f64,
    pub drag_net: f64,
    pub downforce_front_wing: f64,
    pub downforce_sidepod: f64,
    pub downforce_rear_wing: f64,
    pub downforce_net: f64,
    pub moment_front_axis: f64,
}

impl ForceSummary {
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.drag_front_wing,
            self.drag_sidepod,
            self.drag_rear_wing,
            self.drag_net,
            self.downforce_front_wing,
            self.downforce_sidepod,
            self.downforce_rear_wing,
            self.downforce_net,
            self.moment_front_axis,
        ]
    }

    pub fn from_values(values: [f64; FORCE_SUMMARY_LEN]) -> Self {
        Self {
            drag_front_wing: values[0],
            drag_sidepod: values[1],
            drag_rear_wing: values[2],
            drag_net: values[3],
            downforce_front_wing: values[4],
            downforce_sidepod: values[5],
            downforce_rear_wing: values[6],
            downforce_net: values[7],
            moment_front_axis: values[8],
        }
    }
}

/// Supervisor state machine: `NotStarted -> Running -> {Succeeded, Failed, TimedOut, Cancelled}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed { code: Option<i32> },
    TimedOut,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::NotStarted | RunStatus::Running)
    }
}

/// Coarse pipeline stage, reported alongside percentage progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    PreparingLayout,
    WritingJournal,
    RunningSolver,
    ExtractingForces,
    WritingTemplate,
    Completed,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub output_dir: PathBuf,
    pub summary: ForceSummary,
    pub workbook: Option<PathBuf>,
    /// Report files the solver did not produce
    pub missing_reports: Vec<String>,
}

/// Last known state of a run as seen by a frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: String,
    pub case_folder: PathBuf,
    pub status: RunStatus,
    pub stage: Option<RunStage>,
    pub progress: u8,
    pub outcome: Option<PipelineOutcome>,
    pub error_message: Option<String>,
    pub started_at: String,
}

// ---------------------------------------------------------------------------
// HTTP request/response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectCaseRequest {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseInfo {
    pub case_folder: PathBuf,
    pub case_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRunRequest {
    pub case_folder: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRunResponse {
    pub run_id: String,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSeriesQuery {
    pub case_folder: PathBuf,
    pub series: String,
}
