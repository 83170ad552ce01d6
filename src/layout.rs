//! On-disk working layout: a derived, human-inspectable view of pipeline state.
//!
//! The lifecycle tracker (a JSON state file) is the authoritative record;
//! the directory layout mirrors it so an operator can always tell where a
//! document stands by listing directories, and so a lost state file can be
//! reconstructed by inspection:
//!
//! ```text
//! <data>/
//!   input/                 incoming <month>_<year>.pdf documents
//!   pages/<doc>/           kept page images (+ recognised text)
//!   discarded/<doc>/       pages scored below the threshold
//!   ocr_text/<doc>/        optional OCR debug text for kept pages
//!   processed/<period>.json  one ExtractionResult per period
//!   archive/input/         originals, moved after splitting+scoring
//!   archive/pages/         kept-page folders consumed by extraction
//!   archive/processed/     exported ExtractionResults
//!   state.json             lifecycle tracker store
//! ```

use crate::error::PipelineError;
use std::fs;
use std::path::{Path, PathBuf};

/// Resolved directory layout under one data root.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root.join("input")
    }

    /// Kept pages for one document.
    pub fn pages_dir(&self, doc_slug: &str) -> PathBuf {
        self.root.join("pages").join(doc_slug)
    }

    /// Discarded pages for one document.
    pub fn discarded_dir(&self, doc_slug: &str) -> PathBuf {
        self.root.join("discarded").join(doc_slug)
    }

    /// Optional OCR debug text for one document.
    pub fn ocr_text_dir(&self, doc_slug: &str) -> PathBuf {
        self.root.join("ocr_text").join(doc_slug)
    }

    /// Page image filename: `<slug>_pg<index>.png` (0-based index).
    pub fn page_file_name(doc_slug: &str, index: usize) -> String {
        format!("{doc_slug}_pg{index}.png")
    }

    /// Recognised-text sidecar for a kept page, next to its image.
    pub fn page_text_path(image_path: &Path) -> PathBuf {
        image_path.with_extension("txt")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    /// Extraction result for one period.
    pub fn processed_json(&self, period: &str) -> PathBuf {
        self.processed_dir().join(format!("{period}.json"))
    }

    pub fn archived_input_dir(&self) -> PathBuf {
        self.root.join("archive").join("input")
    }

    pub fn archived_pages_dir(&self, doc_slug: &str) -> PathBuf {
        self.root.join("archive").join("pages").join(doc_slug)
    }

    pub fn archived_processed_dir(&self) -> PathBuf {
        self.root.join("archive").join("processed")
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("state.json")
    }

    /// Create every fixed directory. Per-document subdirectories are created
    /// on demand by the stages that write into them.
    pub fn ensure(&self) -> Result<(), PipelineError> {
        for dir in [
            self.input_dir(),
            self.root.join("pages"),
            self.root.join("discarded"),
            self.root.join("ocr_text"),
            self.processed_dir(),
            self.archived_input_dir(),
            self.root.join("archive").join("pages"),
            self.archived_processed_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|source| PipelineError::LayoutIo {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Move a file into `dest_dir`, creating the directory first.
    ///
    /// Falls back to copy+remove when `rename` fails (e.g. across mount
    /// points).
    pub fn move_into(file: &Path, dest_dir: &Path) -> Result<PathBuf, PipelineError> {
        fs::create_dir_all(dest_dir).map_err(|source| PipelineError::LayoutIo {
            path: dest_dir.to_path_buf(),
            source,
        })?;
        let name = file
            .file_name()
            .ok_or_else(|| PipelineError::Internal(format!("no file name in {}", file.display())))?;
        let dest = dest_dir.join(name);
        if fs::rename(file, &dest).is_err() {
            fs::copy(file, &dest).map_err(|source| PipelineError::LayoutIo {
                path: dest.clone(),
                source,
            })?;
            fs::remove_file(file).map_err(|source| PipelineError::LayoutIo {
                path: file.to_path_buf(),
                source,
            })?;
        }
        Ok(dest)
    }

    /// Move a whole directory under `dest_parent`, replacing any stale copy
    /// from an earlier interrupted run.
    pub fn move_dir(dir: &Path, dest: &Path) -> Result<(), PipelineError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|source| PipelineError::LayoutIo {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        if dest.exists() {
            fs::remove_dir_all(dest).map_err(|source| PipelineError::LayoutIo {
                path: dest.to_path_buf(),
                source,
            })?;
        }
        fs::rename(dir, dest).map_err(|source| PipelineError::LayoutIo {
            path: dest.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}
