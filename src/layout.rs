use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::SeriesKind;

pub const CASE_FILE_SUFFIX: &str = ".cas.h5";
pub const PROCESSED_DIR: &str = "processed";

/// A case folder holding exactly one `.cas.h5` case file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseFolder {
    root: PathBuf,
    case_file: PathBuf,
}

impl CaseFolder {
    /// Find the single case file below `root`. The `processed/` subtree is ignored.
    pub fn locate(root: impl AsRef<Path>) -> Result<Self, LayoutError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(LayoutError::NotADirectory(root.to_path_buf()));
        }

        let processed = root.join(PROCESSED_DIR);
        let mut candidates: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_entry(|entry| entry.path() != processed)
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!("Skipping unreadable entry while scanning {:?}: {}", root, err);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(CASE_FILE_SUFFIX))
            .map(|entry| entry.into_path())
            .collect();
        candidates.sort();

        match candidates.len() {
            0 => Err(LayoutError::NoCaseFile(root.to_path_buf())),
            1 => {
                let case_file = candidates.remove(0);
                tracing::info!("Case file: {:?}", case_file);
                Ok(Self {
                    root: root.to_path_buf(),
                    case_file,
                })
            }
            _ => Err(LayoutError::AmbiguousCaseFile {
                folder: root.to_path_buf(),
                candidates,
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn case_file(&self) -> &Path {
        &self.case_file
    }
}

/// The `processed/` tree the pipeline writes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub out_dir: PathBuf,
    pub images_dir: PathBuf,
    pub forces_dir: PathBuf,
}

impl OutputLayout {
    pub fn for_case(case: &CaseFolder) -> Self {
        let out_dir = case.root().join(PROCESSED_DIR);
        Self {
            images_dir: out_dir.join("images"),
            forces_dir: out_dir.join("forces"),
            out_dir,
        }
    }

    /// Create every output directory. Safe to call repeatedly.
    pub fn create(case: &CaseFolder) -> Result<Self, LayoutError> {
        let layout = Self::for_case(case);
        let mut dirs = vec![layout.forces_dir.clone()];
        dirs.extend(SeriesKind::ALL.iter().map(|&kind| layout.series_dir(kind)));

        for dir in dirs {
            fs::create_dir_all(&dir).map_err(|source| LayoutError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }

        tracing::debug!("Output layout ready under {:?}", layout.out_dir);
        Ok(layout)
    }

    pub fn series_dir(&self, kind: SeriesKind) -> PathBuf {
        self.images_dir.join(kind.dir_name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("Not a directory: {0:?}")]
    NotADirectory(PathBuf),
    #[error("No *.cas.h5 case file found in {0:?}")]
    NoCaseFile(PathBuf),
    #[error("More than one *.cas.h5 case file in {folder:?}: {candidates:?}")]
    AmbiguousCaseFile {
        folder: PathBuf,
        candidates: Vec<PathBuf>,
    },
    #[error("Failed to create {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}
