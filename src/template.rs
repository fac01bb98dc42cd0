use std::fs;
use std::path::{Path, PathBuf};

use crate::config::TemplateConfig;
use crate::models::ForceSummary;

/// Writes a [`ForceSummary`] into a fresh copy of the versioned force sheet.
pub struct TemplateWriter {
    config: TemplateConfig,
}

impl TemplateWriter {
    pub fn new(config: &TemplateConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Copy the master template into `forces_dir`, check its version marker
    /// and fill in the nine destination cells. Returns the written workbook.
    pub fn write(&self, summary: &ForceSummary, forces_dir: &Path) -> Result<PathBuf, TemplateError> {
        let values = summary.to_vec();
        self.check_shape(&values)?;

        if !self.config.master.is_file() {
            return Err(TemplateError::MissingTemplate(self.config.master.clone()));
        }
        let destination = forces_dir.join(self.config.file_name());
        fs::copy(&self.config.master, &destination).map_err(|e| {
            TemplateError::IoError(format!(
                "Failed to copy template {:?} to {:?}: {}",
                self.config.master, destination, e
            ))
        })?;

        self.fill(&destination, &values)?;
        tracing::info!("Forces saved in: {:?}", destination);
        Ok(destination)
    }

    /// Check the master template exists and carries the expected marker.
    pub fn verify_master(&self) -> Result<(), TemplateError> {
        if !self.config.master.is_file() {
            return Err(TemplateError::MissingTemplate(self.config.master.clone()));
        }
        let book = umya_spreadsheet::reader::xlsx::read(&self.config.master).map_err(|e| {
            TemplateError::Spreadsheet(format!("Failed to open {:?}: {}", self.config.master, e))
        })?;
        let sheet = book
            .get_sheet(&self.config.sheet_index)
            .ok_or(TemplateError::MissingSheet(self.config.sheet_index))?;
        self.check_marker(sheet.get_value((self.config.marker_column, self.config.marker_row)))
    }

    fn check_marker(&self, marker: String) -> Result<(), TemplateError> {
        if marker != self.config.expected_version {
            return Err(TemplateError::VersionMismatch {
                expected: self.config.expected_version.clone(),
                found: marker,
            });
        }
        Ok(())
    }

    /// Value, row and column counts must all agree.
    pub fn check_shape(&self, values: &[f64]) -> Result<(), TemplateError> {
        if values.len() != self.config.rows.len() || values.len() != self.config.columns.len() {
            return Err(TemplateError::ShapeMismatch {
                values: values.len(),
                rows: self.config.rows.len(),
                columns: self.config.columns.len(),
            });
        }
        Ok(())
    }

    /// Open `workbook`, verify the marker and write `values` in place.
    ///
    /// No cell is touched unless the marker matches.
    pub fn fill(&self, workbook: &Path, values: &[f64]) -> Result<(), TemplateError> {
        self.check_shape(values)?;

        let mut book = umya_spreadsheet::reader::xlsx::read(workbook)
            .map_err(|e| TemplateError::Spreadsheet(format!("Failed to open {:?}: {}", workbook, e)))?;

        let sheet = book
            .get_sheet_mut(&self.config.sheet_index)
            .ok_or(TemplateError::MissingSheet(self.config.sheet_index))?;

        self.check_marker(sheet.get_value((self.config.marker_column, self.config.marker_row)))?;

        for ((&row, &column), &value) in self.config.rows.iter().zip(&self.config.columns).zip(values) {
            if value.is_finite() {
                sheet.get_cell_mut((column, row)).set_value_number(value);
            } else {
                tracing::warn!("Leaving cell (row {}, column {}) blank: value undefined", row, column);
            }
        }

        umya_spreadsheet::writer::xlsx::write(&book, workbook)
            .map_err(|e| TemplateError::Spreadsheet(format!("Failed to save {:?}: {}", workbook, e)))?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template not found: {0:?}")]
    MissingTemplate(PathBuf),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),
    #[error("Template has no sheet at index {0}")]
    MissingSheet(usize),
    #[error("Template version mismatch: expected '{expected}', found '{found}'")]
    VersionMismatch { expected: String, found: String },
    #[error("Shape mismatch: {values} values for {rows} rows and {columns} columns")]
    ShapeMismatch {
        values: usize,
        rows: usize,
        columns: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_master(path: &Path, marker: &str) {
        let mut book = umya_spreadsheet::new_file();
        let sheet = book.get_sheet_mut(&0).unwrap();
        sheet.get_cell_mut("A1").set_value(marker);
        sheet.get_cell_mut("B2").set_value("Drag");
        umya_spreadsheet::writer::xlsx::write(&book, path).unwrap();
    }

    #[test]
    fn test_shape_mismatch_checked_first() {
        let writer = TemplateWriter::new(&TemplateConfig::default());
        let err = writer.check_shape(&[1.0; 8]).unwrap_err();
        assert!(matches!(err, TemplateError::ShapeMismatch { values: 8, rows: 9, columns: 9 }));
    }

    #[test]
    fn test_missing_master_template() {
        let dir = tempfile::tempdir().unwrap();
        let config = TemplateConfig {
            master: dir.path().join("nope.xlsx"),
            ..TemplateConfig::default()
        };
        let summary = ForceSummary::from_values([0.0; 9]);
        let err = TemplateWriter::new(&config).write(&summary, dir.path()).unwrap_err();
        assert!(matches!(err, TemplateError::MissingTemplate(_)));
    }

    #[test]
    fn test_marker_mismatch_leaves_cells_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.xlsx");
        write_master(&path, "v2.0");

        let writer = TemplateWriter::new(&TemplateConfig::default());
        let err = writer.fill(&path, &[1.0; 9]).unwrap_err();
        match err {
            TemplateError::VersionMismatch { expected, found } => {
                assert_eq!(expected, "v1.0");
                assert_eq!(found, "v2.0");
            }
            other => panic!("unexpected error {:?}", other),
        }

        let book = umya_spreadsheet::reader::xlsx::read(&path).unwrap();
        let sheet = book.get_sheet(&0).unwrap();
        assert_eq!(sheet.get_value((3u32, 11u32)), "");
    }

    #[test]
    fn test_padded_marker_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.xlsx");
        write_master(&path, " v1.0 ");

        let writer = TemplateWriter::new(&TemplateConfig::default());
        let err = writer.fill(&path, &[1.0; 9]).unwrap_err();
        assert!(matches!(err, TemplateError::VersionMismatch { ref found, .. } if found == " v1.0 "));

        let book = umya_spreadsheet::reader::xlsx::read(&path).unwrap();
        let sheet = book.get_sheet(&0).unwrap();
        assert_eq!(sheet.get_value((3u32, 11u32)), "");
    }

    #[test]
    fn test_verify_master() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.xlsx");
        let bad = dir.path().join("bad.xlsx");
        write_master(&good, "v1.0");
        write_master(&bad, "v0.9");

        let ok = TemplateConfig {
            master: good,
            ..TemplateConfig::default()
        };
        assert!(TemplateWriter::new(&ok).verify_master().is_ok());

        let wrong = TemplateConfig {
            master: bad,
            ..TemplateConfig::default()
        };
        assert!(matches!(
            TemplateWriter::new(&wrong).verify_master(),
            Err(TemplateError::VersionMismatch { .. })
        ));
    }
}
