use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::ReportConfig;
use crate::models::{Component, ForceReport, ForceSummary, Quantity, QuantityReport};

/// Moves the solver's wall-force reports into the forces directory and turns
/// them into a [`ForceSummary`].
pub struct ReportExtractor {
    config: ReportConfig,
}

/// Result of relocating both reports. A missing file is recorded, not fatal.
#[derive(Debug, Default)]
pub struct CollectedReports {
    pub drag: Option<PathBuf>,
    pub downforce: Option<PathBuf>,
    pub missing: Vec<String>,
}

impl ReportExtractor {
    pub fn new(config: &ReportConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Move `drag` and `downforce` reports from `work_dir` into `forces_dir`.
    pub fn collect_reports(&self, work_dir: &Path, forces_dir: &Path) -> Result<CollectedReports, ReportError> {
        let mut collected = CollectedReports::default();

        for (quantity, name) in [
            (Quantity::Drag, &self.config.drag_file),
            (Quantity::Downforce, &self.config.downforce_file),
        ] {
            match relocate(&work_dir.join(name), &forces_dir.join(name)) {
                Ok(dest) => {
                    tracing::info!("Moved {} report to {:?}", quantity, dest);
                    match quantity {
                        Quantity::Drag => collected.drag = Some(dest),
                        Quantity::Downforce => collected.downforce = Some(dest),
                    }
                }
                Err(ReportError::Missing(path)) => {
                    tracing::warn!("Couldn't find {} report {:?}, {} values left undefined", quantity, path, quantity);
                    collected.missing.push(name.clone());
                }
                Err(err) => return Err(err),
            }
        }

        Ok(collected)
    }

    /// Parse the "Total" column of one report file.
    pub fn parse_report_file(&self, quantity: Quantity, path: &Path) -> Result<QuantityReport, ReportError> {
        let content = fs::read_to_string(path).map_err(|e| ReportError::IoError(format!("Failed to read {:?}: {}", path, e)))?;
        let totals = self.parse_totals(&content).map_err(|e| match e {
            ReportError::TooFewRows { found, needed, .. } => ReportError::TooFewRows {
                file: path.display().to_string(),
                found,
                needed,
            },
            other => other,
        })?;
        tracing::debug!("Parsed {} rows from {:?}", totals.len(), path);
        Ok(QuantityReport { quantity, totals })
    }

    /// Parse report text: skip the fixed header, read the column-name row,
    /// then the "Total" field of every following non-blank row.
    ///
    /// Non-numeric or missing cells become NaN. The row count is checked
    /// against the highest mapped component row.
    pub fn parse_totals(&self, content: &str) -> Result<Vec<f64>, ReportError> {
        let mut rows = content
            .lines()
            .skip(self.config.header_lines)
            .filter(|line| !line.trim().is_empty());

        let header: Vec<&str> = rows
            .next()
            .ok_or_else(|| ReportError::MissingColumn(self.config.total_column.clone()))?
            .split_whitespace()
            .collect();

        let column = header
            .iter()
            .position(|name| *name == self.config.total_column)
            .ok_or_else(|| ReportError::MissingColumn(self.config.total_column.clone()))?;

        let totals: Vec<f64> = rows
            .map(|line| {
                line.split_whitespace()
                    .nth(column)
                    .and_then(|cell| cell.parse::<f64>().ok())
                    .unwrap_or(f64::NAN)
            })
            .collect();

        let needed = self.config.rows.max_row() + 1;
        if totals.len() < needed {
            return Err(ReportError::TooFewRows {
                file: String::new(),
                found: totals.len(),
                needed,
            });
        }

        Ok(totals)
    }

    /// Parse whatever reports were collected.
    pub fn extract(&self, collected: &CollectedReports) -> Result<ForceReport, ReportError> {
        let drag = collected
            .drag
            .as_deref()
            .map(|p| self.parse_report_file(Quantity::Drag, p))
            .transpose()?;
        let downforce = collected
            .downforce
            .as_deref()
            .map(|p| self.parse_report_file(Quantity::Downforce, p))
            .transpose()?;
        Ok(ForceReport { drag, downforce })
    }

    /// Select the named components and net totals. Missing quantities are NaN.
    pub fn summarize(&self, report: &ForceReport) -> ForceSummary {
        let rows = &self.config.rows;
        let pick = |q: &Option<QuantityReport>, c: Component| {
            q.as_ref().map(|r| r.component(rows, c)).unwrap_or(f64::NAN)
        };
        let net = |q: &Option<QuantityReport>| q.as_ref().map(|r| r.net(rows)).unwrap_or(f64::NAN);

        let moment_front_axis = match self.config.moment_row {
            Some(row) => report
                .downforce
                .as_ref()
                .and_then(|r| r.totals.get(row).copied())
                .unwrap_or(f64::NAN),
            None => 0.0,
        };

        let summary = ForceSummary {
            drag_front_wing: pick(&report.drag, Component::FrontWing),
            drag_sidepod: pick(&report.drag, Component::Sidepod),
            drag_rear_wing: pick(&report.drag, Component::RearWing),
            drag_net: net(&report.drag),
            downforce_front_wing: pick(&report.downforce, Component::FrontWing),
            downforce_sidepod: pick(&report.downforce, Component::Sidepod),
            downforce_rear_wing: pick(&report.downforce, Component::RearWing),
            downforce_net: net(&report.downforce),
            moment_front_axis,
        };
        tracing::info!("Force summary: {:?}", summary.to_vec());
        summary
    }
}

/// Move `source` to `dest`, falling back to copy + remove across filesystems.
fn relocate(source: &Path, dest: &Path) -> Result<PathBuf, ReportError> {
    if !source.exists() {
        return Err(ReportError::Missing(source.to_path_buf()));
    }
    match fs::rename(source, dest) {
        Ok(()) => Ok(dest.to_path_buf()),
        Err(err) if err.kind() != io::ErrorKind::NotFound => {
            fs::copy(source, dest)
                .and_then(|_| fs::remove_file(source))
                .map_err(|e| ReportError::IoError(format!("Failed to move {:?} to {:?}: {}", source, dest, e)))?;
            Ok(dest.to_path_buf())
        }
        Err(_) => Err(ReportError::Missing(source.to_path_buf())),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Report file not found: {0:?}")]
    Missing(PathBuf),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Report has no '{0}' column")]
    MissingColumn(String),
    #[error("Report {file} has {found} data rows, component mapping needs {needed}")]
    TooFewRows {
        file: String,
        found: usize,
        needed: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn report_text(header_lines: usize, totals: &[&str]) -> String {
        let mut text = String::new();
        for i in 0..header_lines {
            text.push_str(&format!("header line {}\n", i));
        }
        text.push_str("zone pressure viscous Total\n");
        for (i, total) in totals.iter().enumerate() {
            text.push_str(&format!("zone-{} 1.0 2.0 {}\n", i, total));
        }
        text
    }

    #[test]
    fn test_totals_parsed_after_header() {
        let extractor = ReportExtractor::new(&ReportConfig::default());
        let text = report_text(19, &["0", "1.5", "2", "3", "4", "5", "6", "7", "8", "9"]);
        let totals = extractor.parse_totals(&text).unwrap();
        assert_eq!(totals.len(), 10);
        assert_relative_eq!(totals[1], 1.5);
    }

    #[test]
    fn test_non_numeric_cells_become_nan() {
        let extractor = ReportExtractor::new(&ReportConfig::default());
        let text = report_text(19, &["n/a", "1", "2", "3", "4", "5", "6", "7", "8"]);
        let totals = extractor.parse_totals(&text).unwrap();
        assert!(totals[0].is_nan());
        assert_relative_eq!(totals[8], 8.0);
    }

    #[test]
    fn test_short_report_rejected() {
        let extractor = ReportExtractor::new(&ReportConfig::default());
        let text = report_text(19, &["1", "2", "3"]);
        assert!(matches!(
            extractor.parse_totals(&text),
            Err(ReportError::TooFewRows { found: 3, needed: 9, .. })
        ));
    }

    #[test]
    fn test_missing_total_column() {
        let extractor = ReportExtractor::new(&ReportConfig::default());
        let text = "a\nb\nzone pressure viscous\n";
        let config = ReportConfig {
            header_lines: 2,
            ..ReportConfig::default()
        };
        let extractor_two = ReportExtractor::new(&config);
        assert!(matches!(extractor_two.parse_totals(text), Err(ReportError::MissingColumn(_))));
        assert!(extractor.parse_totals("").is_err());
    }

    #[test]
    fn test_summary_uses_component_rows() {
        let extractor = ReportExtractor::new(&ReportConfig::default());
        // rows: chassis 1, front-wheel 3, front-wing 4, rear-wheel 5, rear-wing 6, sidepod 8
        let mut totals = vec![1000.0; 10];
        totals[1] = 10.0;
        totals[3] = 20.0;
        totals[4] = 30.0;
        totals[5] = 40.0;
        totals[6] = 50.0;
        totals[8] = 60.0;
        let drag = QuantityReport {
            quantity: Quantity::Drag,
            totals: totals.clone(),
        };
        let downforce = QuantityReport {
            quantity: Quantity::Downforce,
            totals: totals.iter().map(|v| -v).collect(),
        };
        let summary = extractor.summarize(&ForceReport {
            drag: Some(drag),
            downforce: Some(downforce),
        });

        assert_relative_eq!(summary.drag_front_wing, 30.0);
        assert_relative_eq!(summary.drag_sidepod, 60.0);
        assert_relative_eq!(summary.drag_rear_wing, 50.0);
        assert_relative_eq!(summary.drag_net, 210.0);
        assert_relative_eq!(summary.downforce_net, -210.0);
        assert_relative_eq!(summary.moment_front_axis, 0.0);
    }

    #[test]
    fn test_missing_quantity_is_undefined() {
        let extractor = ReportExtractor::new(&ReportConfig::default());
        let drag = QuantityReport {
            quantity: Quantity::Drag,
            totals: vec![1.0; 9],
        };
        let summary = extractor.summarize(&ForceReport {
            drag: Some(drag),
            downforce: None,
        });
        assert_relative_eq!(summary.drag_net, 6.0);
        assert!(summary.downforce_net.is_nan());
        assert!(summary.downforce_front_wing.is_nan());
    }

    #[test]
    fn test_configured_moment_row() {
        let config = ReportConfig {
            moment_row: Some(2),
            ..ReportConfig::default()
        };
        let extractor = ReportExtractor::new(&config);
        let mut totals = vec![0.0; 9];
        totals[2] = 42.0;
        let summary = extractor.summarize(&ForceReport {
            drag: None,
            downforce: Some(QuantityReport {
                quantity: Quantity::Downforce,
                totals,
            }),
        });
        assert_relative_eq!(summary.moment_front_axis, 42.0);
    }

    #[test]
    fn test_collect_moves_and_records_missing() {
        let work = tempfile::tempdir().unwrap();
        let forces = work.path().join("processed/forces");
        fs::create_dir_all(&forces).unwrap();
        fs::write(work.path().join("drag.csv"), report_text(19, &["1"; 9])).unwrap();

        let extractor = ReportExtractor::new(&ReportConfig::default());
        let collected = extractor.collect_reports(work.path(), &forces).unwrap();

        assert_eq!(collected.drag, Some(forces.join("drag.csv")));
        assert!(!work.path().join("drag.csv").exists());
        assert!(collected.downforce.is_none());
        assert_eq!(collected.missing, vec!["df.csv".to_string()]);

        let report = extractor.extract(&collected).unwrap();
        assert!(report.drag.is_some());
        assert!(report.downforce.is_none());
    }
}
