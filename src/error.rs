//! Error types for the stormdata pipeline.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`] - **Fatal**: the run cannot proceed at all (bad
//!   configuration, missing credentials, the state store cannot be read or
//!   written). Returned as `Err(PipelineError)` from the top-level run
//!   functions.
//!
//! * [`StageFailure`] - **Non-fatal**: one document, page, or reporting
//!   period failed but every other unit of work is fine. Collected into the
//!   [`crate::records::RunSummary`] so callers can inspect partial success
//!   rather than losing a whole batch to one bad scan.
//!
//! The separation matches the propagation policy: failures local to one page
//! or one period never abort processing of other pages or periods; only
//! configuration and credential errors at startup abort the whole run.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the stormdata library.
///
/// Per-document and per-period failures use [`StageFailure`] and are
/// reported in the run summary rather than propagated here.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required credential is missing or empty.
    #[error("Missing credential '{name}'.\n{hint}")]
    MissingCredential { name: String, hint: String },

    /// The input directory does not exist and could not be created.
    #[error("Input directory '{path}' is not accessible: {source}")]
    InputDirUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The lifecycle state file exists but cannot be parsed.
    ///
    /// This is fatal: proceeding with a corrupt state file would risk
    /// re-extracting and re-exporting completed periods.
    #[error("Lifecycle state file '{path}' is corrupt: {detail}\nMove it aside to start from a clean slate.")]
    StateFileCorrupt { path: PathBuf, detail: String },

    /// The lifecycle state file could not be read or written.
    #[error("Failed to access lifecycle state file '{path}': {source}")]
    StateFileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create one of the working directories.
    #[error("Failed to create directory '{path}': {source}")]
    LayoutIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy."
    )]
    PdfiumBindingFailed(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure scoped to one document, page, or period.
///
/// Stored in the run summary. The run continues past every one of these;
/// the affected unit stays in (or is moved to) a state from which the next
/// run can retry it.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum StageFailure {
    /// The source document could not be opened or split at all.
    /// No partial pages are emitted for it.
    #[error("Document '{doc}' is unreadable: {detail}")]
    DocumentUnreadable { doc: String, detail: String },

    /// The filename does not match the `<month>_<year>` convention, so no
    /// period key can be derived. The document is reported and skipped
    /// rather than silently grouped under a wrong key.
    #[error("Document '{doc}' has no recognisable <month>_<year> period in its name")]
    UnrecognizedPeriod { doc: String },

    /// OCR produced no text for a page. Downgraded to a `discarded`
    /// classification by the scorer; recorded here for the summary only.
    #[error("OCR produced no text for page {page} of '{doc}'")]
    OcrFailed { doc: String, page: usize },

    /// A `scored-kept` page image was recovered from the layout but its
    /// recognised-text sidecar is gone. The page still participates in its
    /// period (with empty text, which the prompt assembly skips), so the
    /// loss is surfaced rather than silent.
    #[error("Kept page {page} of '{doc}' has no recognised-text file")]
    PageTextMissing { doc: String, page: usize },

    /// The extraction adapter exhausted its retries for a period.
    #[error("Extraction failed for period '{period}' after {attempts} attempts: {detail}")]
    ExtractionFailed {
        period: String,
        attempts: u32,
        detail: String,
    },

    /// The adapter responded, but the payload did not match the expected
    /// schema shape even after the single malformed-output retry.
    #[error("Extraction output for period '{period}' is malformed: {detail}")]
    MalformedExtraction { period: String, detail: String },

    /// The export adapter exhausted its retries. The period remains
    /// `extracted` and is re-exported on the next run.
    #[error("Export failed for period '{period}' after {attempts} attempts: {detail}")]
    ExportFailed {
        period: String,
        attempts: u32,
        detail: String,
    },
}

impl StageFailure {
    /// Short machine-readable kind, used in the summary table.
    pub fn kind(&self) -> &'static str {
        match self {
            StageFailure::DocumentUnreadable { .. } => "document-unreadable",
            StageFailure::UnrecognizedPeriod { .. } => "unrecognized-period",
            StageFailure::OcrFailed { .. } => "ocr-failed",
            StageFailure::PageTextMissing { .. } => "page-text-missing",
            StageFailure::ExtractionFailed { .. } => "extraction-failed",
            StageFailure::MalformedExtraction { .. } => "malformed-extraction",
            StageFailure::ExportFailed { .. } => "export-failed",
        }
    }
}
