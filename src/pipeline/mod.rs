//! Pipeline stages, one module per transformation step.
//!
//! Keeping stages separate makes each independently testable and lets the
//! pure middle of the pipeline (grouping, ordering, merging) be exercised
//! without pdfium, tesseract, or the network.
//!
//! ## Data Flow
//!
//! ```text
//! split ──▶ score ──▶ group ──▶ extract ──▶ merge ──▶ export
//! (pdfium)  (OCR +    (period   (LLM with   (normalise (rows to
//!           keywords)  + order)  retries)    + dedupe)  spreadsheet)
//! ```
//!
//! 1. [`split`]   - one image per physical page, order-preserving; pdfium
//!    runs in `spawn_blocking`
//! 2. [`score`]   - OCR + keyword scoring; decides kept vs discarded
//! 3. [`group`]   - derive period keys, group kept pages, order for
//!    continuation
//! 4. [`extract`] - the LLM adapter boundary, chunking, retry, validation
//! 5. [`merge`]   - normalise numerics/dates, dedupe across chunks
//! 6. [`export`]  - the spreadsheet adapter boundary with retry
//!
//! The lifecycle tracker is consulted and updated between stages by
//! [`crate::runner`], never by the stages themselves.

pub mod export;
pub mod extract;
pub mod group;
pub mod merge;
pub mod score;
pub mod split;
