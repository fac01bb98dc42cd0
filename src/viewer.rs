use std::fs;
use std::path::{Path, PathBuf};

use crate::layout::PROCESSED_DIR;
use crate::models::SeriesKind;

/// The rendered images of one series, in image-number order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSeries {
    pub kind: Option<SeriesKind>,
    pub dir: PathBuf,
    pub images: Vec<PathBuf>,
}

impl ImageSeries {
    /// List the `*.png` files directly inside `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, ViewerError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|e| ViewerError::IoError(format!("Failed to list {:?}: {}", dir, e)))?;

        let mut images = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| ViewerError::IoError(format!("Failed to list {:?}: {}", dir, e)))?
                .path();
            let is_png = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("png"))
                .unwrap_or(false);
            if path.is_file() && is_png {
                images.push(path);
            }
        }
        images.sort_by_cached_key(|path| image_order(path));

        if images.is_empty() {
            return Err(ViewerError::EmptySeries(dir.to_path_buf()));
        }

        Ok(Self {
            kind: None,
            dir: dir.to_path_buf(),
            images,
        })
    }

    /// Load one of the four sweep series of a processed case folder.
    pub fn for_case(case_folder: impl AsRef<Path>, kind: SeriesKind) -> Result<Self, ViewerError> {
        let dir = case_folder
            .as_ref()
            .join(PROCESSED_DIR)
            .join("images")
            .join(kind.dir_name());
        let mut series = Self::from_dir(dir)?;
        series.kind = Some(kind);
        Ok(series)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Several series reviewed side by side, moved together.
///
/// Every series keeps its own index. Moves on the first series are mapped
/// proportionally onto the others so series of different lengths stay at
/// the same relative plane.
#[derive(Debug, Clone)]
pub struct SeriesCursor {
    series: Vec<ImageSeries>,
    indices: Vec<usize>,
}

impl SeriesCursor {
    pub fn new(series: Vec<ImageSeries>) -> Result<Self, ViewerError> {
        if series.is_empty() {
            return Err(ViewerError::NoSeries);
        }
        if let Some(empty) = series.iter().find(|s| s.is_empty()) {
            return Err(ViewerError::EmptySeries(empty.dir.clone()));
        }
        let indices = vec![0; series.len()];
        Ok(Self { series, indices })
    }

    /// Add another series; every index resets to the first image.
    pub fn push(&mut self, series: ImageSeries) -> Result<(), ViewerError> {
        if series.is_empty() {
            return Err(ViewerError::EmptySeries(series.dir));
        }
        self.series.push(series);
        self.indices = vec![0; self.series.len()];
        Ok(())
    }

    pub fn series(&self) -> &[ImageSeries] {
        &self.series
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Image currently shown for each series.
    pub fn current(&self) -> Vec<&Path> {
        self.series
            .iter()
            .zip(&self.indices)
            .map(|(s, &i)| s.images[i].as_path())
            .collect()
    }

    /// Slider position 0..=100 selects `round(n * pos / 100)` in each series.
    pub fn set_slider(&mut self, position: u8) {
        let position = f64::from(position.min(100));
        for (series, index) in self.series.iter().zip(self.indices.iter_mut()) {
            let n = series.len();
            *index = clamp_index((n as f64 * position / 100.0).round(), n);
        }
    }

    /// Slider position matching the first series.
    pub fn slider_position(&self) -> u8 {
        let n = self.series[0].len();
        (100.0 * self.indices[0] as f64 / n as f64).round().clamp(0.0, 100.0) as u8
    }

    pub fn next(&mut self) {
        self.step_first(1);
    }

    pub fn previous(&mut self) {
        self.step_first(-1);
    }

    fn step_first(&mut self, delta: i64) {
        let n_first = self.series[0].len() as f64;
        let spot = (self.indices[0] as i64 + delta) as f64 / n_first;
        for (series, index) in self.series.iter().zip(self.indices.iter_mut()) {
            let n = series.len();
            *index = clamp_index((spot * n as f64).round(), n);
        }
    }

    /// Advance every series by one image, wrapping to the start.
    pub fn step_animation(&mut self) {
        for (series, index) in self.series.iter().zip(self.indices.iter_mut()) {
            *index += 1;
            if *index >= series.len() {
                *index = 0;
            }
        }
    }
}

/// Sort key: file stem prefix, then its trailing number read as a value,
/// so `side_vel_100` follows `side_vel_99`.
fn image_order(path: &Path) -> (String, Option<u64>, PathBuf) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let prefix = stem.trim_end_matches(|c: char| c.is_ascii_digit());
    let number = stem[prefix.len()..].parse::<u64>().ok();
    (prefix.to_string(), number, path.to_path_buf())
}

fn clamp_index(raw: f64, len: usize) -> usize {
    raw.clamp(0.0, (len - 1) as f64) as usize
}

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("No images in {0:?}")]
    EmptySeries(PathBuf),
    #[error("No image series selected")]
    NoSeries,
    #[error("Unknown image series '{0}'")]
    UnknownSeries(String),
    #[error("IO error: {0}")]
    IoError(String),
}
