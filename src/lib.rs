//! # stormdata
//!
//! Digitises scanned NOAA storm-report documents into structured records:
//! split each incoming PDF into page images, OCR and keyword-score every
//! page to find the storm tables, group kept pages by reporting period,
//! extract structured records through an LLM adapter with bounded retries,
//! normalise and dedupe the results, and append them as rows to a
//! spreadsheet endpoint.
//!
//! Every document, page, and period is tracked through a persistent
//! lifecycle store, so a run can be killed and restarted at any point
//! without re-scoring pages, re-calling the LLM, or exporting duplicate
//! rows.
//!
//! ## Pipeline
//!
//! ```text
//! input/*.pdf
//!    │ split (pdfium, spawn_blocking)
//!    ▼
//! page images ──▶ OCR + keyword score ──▶ kept / discarded
//!    │ group by <month>_<year> period key, continuation order
//!    ▼
//! period page texts ──▶ LLM extraction (chunked, retried)
//!    │ normalise + dedupe
//!    ▼
//! processed/<period>.json ──▶ spreadsheet rows (retried)
//! ```
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use stormdata::{Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), stormdata::PipelineError> {
//!     let config = PipelineConfig::builder()
//!         .data_dir("data")
//!         .gemini_api_key(std::env::var("GEMINI_API_KEY").unwrap_or_default())
//!         .export_url("https://example.com/append")
//!         .build()?;
//!
//!     let mut pipeline = Pipeline::new(config)?;
//!     let summary = pipeline.run().await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```
//!
//! ## Custom adapters
//!
//! The three external collaborators sit behind traits: [`ocr::OcrEngine`]
//! for text recognition, [`pipeline::extract::ExtractionAdapter`] for the
//! LLM, and [`pipeline::export::ExportAdapter`] for the spreadsheet. Wire
//! your own via [`Pipeline::with_adapters`]; the bundled implementations
//! are tesseract, Gemini `generateContent`, and a JSON-POST endpoint.

pub mod config;
pub mod document;
pub mod error;
pub mod layout;
pub mod lifecycle;
pub mod ocr;
pub mod pipeline;
pub mod prompts;
pub mod records;
pub mod retry;
pub mod runner;
pub mod scoring;

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use document::{Page, PageClass, PeriodKey, SourceDocument};
pub use error::{PipelineError, StageFailure};
pub use lifecycle::{LifecycleState, LifecycleTracker};
pub use records::{ExtractionResult, RunSummary, StormRecord};
pub use retry::RetryPolicy;
pub use runner::Pipeline;
pub use scoring::{KeywordRule, ScoringRules};
