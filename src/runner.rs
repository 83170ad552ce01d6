//! Pipeline orchestration: discovery → split → score → group → extract →
//! export, with the lifecycle tracker consulted at every stage boundary.
//!
//! The runner is deliberately restartable. Each stage reads its input from
//! the on-disk layout, skips units the tracker marks as already done, and
//! commits its output (files first, then the tracker) before moving on. Kill
//! the process at any point and the next [`Pipeline::run`] resumes from the
//! last committed state without duplicating adapter calls or export rows.
//!
//! Periods extract concurrently (they are independent), but all tracker
//! mutations happen on the runner task, sequentially, after each batch of
//! results is collected.

use crate::config::PipelineConfig;
use crate::document::{Page, PageClass, SourceDocument};
use crate::error::{PipelineError, StageFailure};
use crate::layout::DataLayout;
use crate::lifecycle::{doc_id, page_id, period_id, LifecycleState, LifecycleTracker};
use crate::ocr::{OcrEngine, TesseractOcr};
use crate::pipeline::export::{export_result, ExportAdapter, HttpSheetExporter};
use crate::pipeline::extract::{extract_period, ExtractionAdapter, GeminiExtractor};
use crate::pipeline::group::group_kept_pages;
use crate::pipeline::merge::merge_records;
use crate::pipeline::score::score_image;
use crate::pipeline::split::split_document;
use crate::records::{ExtractionResult, RunSummary};
use futures::stream::{self, StreamExt};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{info, warn};

/// One configured pipeline instance over one data root.
pub struct Pipeline {
    config: PipelineConfig,
    layout: DataLayout,
    tracker: LifecycleTracker,
    ocr: Arc<dyn OcrEngine>,
    extractor: Option<Arc<dyn ExtractionAdapter>>,
    exporter: Option<Arc<dyn ExportAdapter>>,
}

impl Pipeline {
    /// Build a pipeline with the bundled adapters (tesseract, Gemini, HTTP
    /// sheet endpoint). Credentials are validated here, up front, so a
    /// missing key fails the run before any document is touched.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let extractor: Option<Arc<dyn ExtractionAdapter>> = if config.enable_extraction {
            let key = config
                .gemini_api_key
                .as_deref()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| PipelineError::MissingCredential {
                    name: "GEMINI_API_KEY".into(),
                    hint: "Set the GEMINI_API_KEY environment variable (or .env entry), \
                           or disable extraction to run scoring only."
                        .into(),
                })?;
            Some(Arc::new(GeminiExtractor::new(
                key.to_string(),
                config.model.clone(),
                config.api_timeout,
            )?))
        } else {
            None
        };

        let exporter: Option<Arc<dyn ExportAdapter>> = if config.enable_export {
            let url = config
                .export_url
                .as_deref()
                .filter(|u| !u.is_empty())
                .ok_or_else(|| PipelineError::MissingCredential {
                    name: "STORMDATA_EXPORT_URL".into(),
                    hint: "Set the STORMDATA_EXPORT_URL environment variable (or .env \
                           entry), or disable export to stop after extraction."
                        .into(),
                })?;
            Some(Arc::new(HttpSheetExporter::new(
                url.to_string(),
                config.export_token.clone(),
                config.api_timeout,
            )?))
        } else {
            None
        };

        Self::assemble(config, Arc::new(TesseractOcr::new()), extractor, exporter)
    }

    /// Build a pipeline with caller-supplied adapters. No credential checks:
    /// whatever is wired in is what runs.
    pub fn with_adapters(
        config: PipelineConfig,
        ocr: Arc<dyn OcrEngine>,
        extractor: Option<Arc<dyn ExtractionAdapter>>,
        exporter: Option<Arc<dyn ExportAdapter>>,
    ) -> Result<Self, PipelineError> {
        Self::assemble(config, ocr, extractor, exporter)
    }

    fn assemble(
        config: PipelineConfig,
        ocr: Arc<dyn OcrEngine>,
        extractor: Option<Arc<dyn ExtractionAdapter>>,
        exporter: Option<Arc<dyn ExportAdapter>>,
    ) -> Result<Self, PipelineError> {
        let layout = DataLayout::new(&config.data_dir);
        layout.ensure()?;
        let tracker = LifecycleTracker::open(layout.state_file())?;
        Ok(Self {
            config,
            layout,
            tracker,
            ocr,
            extractor,
            exporter,
        })
    }

    /// Run the full pipeline once over the current input and working state.
    pub async fn run(&mut self) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();

        self.ingest_documents(&mut summary).await?;

        let (kept, recovery_failures) = self.recover_kept_pages()?;
        for failure in recovery_failures {
            warn!("{failure}");
            summary.record_failure(failure);
        }
        let (groups, group_failures) = group_kept_pages(kept);
        for failure in group_failures {
            warn!("{failure}");
            summary.record_failure(failure);
        }

        if self.config.enable_extraction {
            self.extract_periods(groups, &mut summary).await?;
        } else if !groups.is_empty() {
            info!("extraction disabled; {} period(s) left pending", groups.len());
            summary.periods_skipped += groups.len();
        }

        if self.config.enable_export {
            self.export_periods(&mut summary).await?;
        }

        info!("run complete\n{summary}");
        Ok(summary)
    }

    // ── Stage 1: discovery, splitting, scoring ──────────────────────────

    async fn ingest_documents(&mut self, summary: &mut RunSummary) -> Result<(), PipelineError> {
        for mut doc in self.discover_documents()? {
            summary.documents_seen += 1;
            let did = doc_id(&doc.file_name);
            if self.tracker.state_of(&did) == LifecycleState::Archived {
                info!("'{}' already ingested, skipping", doc.file_name);
                continue;
            }
            if doc.period_key().is_none() {
                let failure = StageFailure::UnrecognizedPeriod {
                    doc: doc.file_name.clone(),
                };
                warn!("{failure}");
                summary.record_failure(failure);
                continue;
            }

            let pages = match split_document(&doc.path, &self.config).await? {
                Ok(pages) => pages,
                Err(failure) => {
                    warn!("{failure}");
                    self.tracker.record_failed(&did)?;
                    summary.documents_failed += 1;
                    summary.record_failure(failure);
                    continue;
                }
            };
            doc.page_count = pages.len();

            let slug = doc.slug();
            for split in pages {
                let pid = page_id(&slug, split.index);
                if self.tracker.state_of(&pid) != LifecycleState::Pending {
                    continue;
                }

                let ocr = Arc::clone(&self.ocr);
                let rules = self.config.rules.clone();
                let image = split.image;
                let (image, outcome) = tokio::task::spawn_blocking(move || {
                    let outcome = score_image(ocr.as_ref(), &image, &rules);
                    (image, outcome)
                })
                .await
                .map_err(|e| PipelineError::Internal(format!("score task panicked: {e}")))?;

                let file_name = DataLayout::page_file_name(&slug, split.index);
                if outcome.kept() {
                    let dir = self.layout.pages_dir(&slug);
                    create_dir(&dir)?;
                    let img_path = dir.join(&file_name);
                    save_image(&image, &img_path)?;
                    write_file(&DataLayout::page_text_path(&img_path), &outcome.text)?;
                    if self.config.save_ocr_text {
                        self.write_debug_text(&slug, split.index, &outcome)?;
                    }
                    self.tracker.record_scored(&pid, true)?;
                    summary.pages_kept += 1;
                } else {
                    if outcome.text.trim().is_empty() {
                        summary.record_failure(StageFailure::OcrFailed {
                            doc: doc.file_name.clone(),
                            page: split.index,
                        });
                    }
                    let dir = self.layout.discarded_dir(&slug);
                    create_dir(&dir)?;
                    save_image(&image, &dir.join(&file_name))?;
                    self.tracker.record_scored(&pid, false)?;
                    summary.pages_discarded += 1;
                }
            }

            DataLayout::move_into(&doc.path, &self.layout.archived_input_dir())?;
            self.tracker.record_archived(&did)?;
            info!(
                "'{}': {} page(s) scored, original archived",
                doc.file_name, doc.page_count
            );
        }
        Ok(())
    }

    /// List `*.pdf` files in the input directory, sorted by name. The sorted
    /// position is the document's arrival order for this run.
    fn discover_documents(&self) -> Result<Vec<SourceDocument>, PipelineError> {
        let dir = &self.config.input_dir;
        fs::create_dir_all(dir).map_err(|source| PipelineError::InputDirUnavailable {
            path: dir.clone(),
            source,
        })?;

        let mut found: Vec<(String, PathBuf)> = Vec::new();
        let entries = fs::read_dir(dir).map_err(|source| PipelineError::InputDirUnavailable {
            path: dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| PipelineError::InputDirUnavailable {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            let is_pdf = path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false);
            if !is_pdf || !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                found.push((name.to_string(), path));
            }
        }
        found.sort();

        Ok(found
            .into_iter()
            .enumerate()
            .map(|(arrival, (file_name, path))| SourceDocument {
                file_name,
                path,
                arrival,
                discovered_at: SystemTime::now(),
                page_count: 0,
            })
            .collect())
    }

    fn write_debug_text(
        &self,
        slug: &str,
        index: usize,
        outcome: &crate::pipeline::score::PageScore,
    ) -> Result<(), PipelineError> {
        let dir = self.layout.ocr_text_dir(slug);
        create_dir(&dir)?;
        let body = format!(
            "score: {}\nmatched: {}\n\n{}",
            outcome.score,
            outcome.matched.join(", "),
            outcome.text
        );
        write_file(&dir.join(format!("{slug}_pg{index}.txt")), &body)
    }

    // ── Stage 2: recover kept pages from the layout ─────────────────────

    /// Rebuild the kept-page set from `pages/`, independent of whether the
    /// pages were scored this run or by an earlier, interrupted one. Only
    /// pages the tracker still marks `scored-kept` participate.
    ///
    /// A kept page whose text sidecar is missing is reported as
    /// `PageTextMissing` and carried with empty text, so the period is
    /// never silently diluted.
    fn recover_kept_pages(&self) -> Result<(Vec<Page>, Vec<StageFailure>), PipelineError> {
        let pages_root = self.layout.root().join("pages");
        let mut slugs: Vec<String> = Vec::new();
        for entry in fs::read_dir(&pages_root).map_err(|source| PipelineError::LayoutIo {
            path: pages_root.clone(),
            source,
        })? {
            let entry = entry.map_err(|source| PipelineError::LayoutIo {
                path: pages_root.clone(),
                source,
            })?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    slugs.push(name.to_string());
                }
            }
        }
        slugs.sort();

        let mut out = Vec::new();
        let mut failures = Vec::new();
        for (arrival, slug) in slugs.iter().enumerate() {
            let dir = self.layout.pages_dir(slug);
            let mut found: Vec<(usize, PathBuf)> = Vec::new();
            for entry in fs::read_dir(&dir).map_err(|source| PipelineError::LayoutIo {
                path: dir.clone(),
                source,
            })? {
                let entry = entry.map_err(|source| PipelineError::LayoutIo {
                    path: dir.clone(),
                    source,
                })?;
                let path = entry.path();
                if let Some(index) = parse_page_index(&path) {
                    found.push((index, path));
                }
            }
            found.sort();

            for (index, image_path) in found {
                if self.tracker.state_of(&page_id(slug, index)) != LifecycleState::ScoredKept {
                    continue;
                }
                let text = match fs::read_to_string(DataLayout::page_text_path(&image_path)) {
                    Ok(text) => text,
                    Err(_) => {
                        failures.push(StageFailure::PageTextMissing {
                            doc: slug.clone(),
                            page: index,
                        });
                        String::new()
                    }
                };
                out.push(Page {
                    doc: slug.clone(),
                    doc_arrival: arrival,
                    index,
                    image_path,
                    text,
                    score: 0,
                    class: PageClass::Kept,
                });
            }
        }
        Ok((out, failures))
    }

    // ── Stage 3: extraction ─────────────────────────────────────────────

    async fn extract_periods(
        &mut self,
        groups: std::collections::BTreeMap<crate::document::PeriodKey, Vec<Page>>,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        let Some(extractor) = self.extractor.clone() else {
            return Ok(());
        };

        let mut jobs = Vec::new();
        for (key, pages) in groups {
            let pid = period_id(&key.to_string());
            match self.tracker.state_of(&pid) {
                LifecycleState::Extracted
                | LifecycleState::Exported
                | LifecycleState::Archived => {
                    info!("period {key} already extracted, skipping");
                    summary.periods_skipped += 1;
                }
                _ => jobs.push((key, pages)),
            }
        }

        let retry = self.config.retry.clone();
        let rules = self.config.rules.clone();
        let max_chars = self.config.chunk_max_chars;
        let mut results: Vec<_> = stream::iter(jobs)
            .map(|(key, pages)| {
                let extractor = Arc::clone(&extractor);
                let retry = retry.clone();
                let rules = rules.clone();
                async move {
                    let texts: Vec<(usize, String)> =
                        pages.iter().map(|p| (p.index, p.text.clone())).collect();
                    let outcome = extract_period(
                        extractor.as_ref(),
                        &retry,
                        &rules,
                        &key,
                        &texts,
                        max_chars,
                    )
                    .await;
                    (key, pages, outcome)
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        // Completion order is nondeterministic; commit in period order.
        results.sort_by(|a, b| a.0.cmp(&b.0));

        for (key, pages, outcome) in results {
            let pid = period_id(&key.to_string());
            match outcome {
                Ok(raw) => {
                    let result = ExtractionResult {
                        period: key.clone(),
                        records: merge_records(vec![raw]),
                        pages: pages.iter().map(Page::id).collect(),
                    };
                    self.write_processed(&result)?;
                    self.tracker.record_extracted(&pid)?;
                    for page in &pages {
                        self.tracker.record_extracted(&page_id(&page.doc, page.index))?;
                    }
                    self.archive_page_dirs(&pages)?;
                    summary.periods_extracted += 1;
                    info!(
                        "period {key}: {} record(s) from {} page(s)",
                        result.records.len(),
                        pages.len()
                    );
                }
                Err(failure) => {
                    warn!("{failure}");
                    self.tracker.record_failed(&pid)?;
                    summary.periods_failed += 1;
                    summary.record_failure(failure);
                }
            }
        }
        Ok(())
    }

    /// Write the period's result file atomically (temp + rename), so a crash
    /// never leaves a half-written result for the export stage to read.
    fn write_processed(&self, result: &ExtractionResult) -> Result<(), PipelineError> {
        let path = self.layout.processed_json(&result.period.to_string());
        let json = serde_json::to_string_pretty(result)
            .map_err(|e| PipelineError::Internal(format!("result serialise: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| PipelineError::LayoutIo {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| PipelineError::LayoutIo {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }

    fn archive_page_dirs(&self, pages: &[Page]) -> Result<(), PipelineError> {
        let mut slugs: Vec<&str> = pages.iter().map(|p| p.doc.as_str()).collect();
        slugs.sort();
        slugs.dedup();
        for slug in slugs {
            let dir = self.layout.pages_dir(slug);
            if dir.is_dir() {
                DataLayout::move_dir(&dir, &self.layout.archived_pages_dir(slug))?;
            }
        }
        Ok(())
    }

    // ── Stage 4: export ─────────────────────────────────────────────────

    async fn export_periods(&mut self, summary: &mut RunSummary) -> Result<(), PipelineError> {
        let Some(exporter) = self.exporter.clone() else {
            return Ok(());
        };

        let dir = self.layout.processed_dir();
        let mut files: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|source| PipelineError::LayoutIo {
            path: dir.clone(),
            source,
        })? {
            let entry = entry.map_err(|source| PipelineError::LayoutIo {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                files.push(path);
            }
        }
        files.sort();

        for path in files {
            let text = fs::read_to_string(&path).map_err(|source| PipelineError::LayoutIo {
                path: path.clone(),
                source,
            })?;
            let result: ExtractionResult = serde_json::from_str(&text).map_err(|e| {
                PipelineError::Internal(format!(
                    "result file '{}' is corrupt: {e}",
                    path.display()
                ))
            })?;

            let pid = period_id(&result.period.to_string());
            if matches!(
                self.tracker.state_of(&pid),
                LifecycleState::Exported | LifecycleState::Archived
            ) {
                info!("period {} already exported, skipping", result.period);
                continue;
            }

            match export_result(exporter.as_ref(), &self.config.retry, &result).await {
                Ok(n) => {
                    self.tracker.record_exported(&pid)?;
                    DataLayout::move_into(&path, &self.layout.archived_processed_dir())?;
                    self.tracker.record_archived(&pid)?;
                    summary.rows_exported += n;
                }
                Err(failure) => {
                    warn!("{failure}");
                    self.tracker.record_failed(&pid)?;
                    summary.rows_pending += result.to_rows().len();
                    summary.record_failure(failure);
                }
            }
        }
        Ok(())
    }
}

/// Parse the page index from a `<slug>_pg<N>.png` file name.
fn parse_page_index(path: &Path) -> Option<usize> {
    if path.extension().map(|e| e != "png").unwrap_or(true) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (_, index) = stem.rsplit_once("_pg")?;
    index.parse().ok()
}

fn create_dir(dir: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(dir).map_err(|source| PipelineError::LayoutIo {
        path: dir.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: &str) -> Result<(), PipelineError> {
    fs::write(path, contents).map_err(|source| PipelineError::LayoutIo {
        path: path.to_path_buf(),
        source,
    })
}

fn save_image(image: &image::DynamicImage, path: &Path) -> Result<(), PipelineError> {
    image
        .save(path)
        .map_err(|e| PipelineError::Internal(format!("save '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_index_parses_from_file_name() {
        assert_eq!(parse_page_index(Path::new("jan_1993_pg0.png")), Some(0));
        assert_eq!(parse_page_index(Path::new("a/b/jan_1993_pg12.png")), Some(12));
        assert_eq!(parse_page_index(Path::new("jan_1993_pg0.txt")), None);
        assert_eq!(parse_page_index(Path::new("jan_1993.png")), None);
    }
}
