//! Configuration for a pipeline run.
//!
//! All behaviour is controlled through one immutable [`PipelineConfig`],
//! built via its [`PipelineConfigBuilder`] and passed into the pipeline
//! entry point. There is no ambient global state: stage toggles, the scoring
//! threshold, and storage locations all live here, so two runs can be
//! diffed by diffing their configs.

use crate::error::PipelineError;
use crate::retry::RetryPolicy;
use crate::scoring::ScoringRules;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one batch run of the storm-report pipeline.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use stormdata::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .data_dir("data")
///     .keep_threshold(6)
///     .save_ocr_text(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Directory scanned for incoming `<month>_<year>.pdf` documents.
    /// Default: `data/input`.
    pub input_dir: PathBuf,

    /// Root of the working layout (kept/discarded/processed/archive
    /// directories and the lifecycle state file). Default: `data`.
    pub data_dir: PathBuf,

    /// Keyword rules and keep threshold for page scoring.
    pub rules: ScoringRules,

    /// Run the extraction stage. Default: true.
    ///
    /// Disabled, the run stops after scoring: pages are classified and the
    /// layout is populated, but no adapter calls are made. Useful for
    /// tuning the threshold against a new batch of scans.
    pub enable_extraction: bool,

    /// Run the export stage. Default: true.
    pub enable_export: bool,

    /// Persist recognised OCR text for each kept page for audit. Default: false.
    pub save_ocr_text: bool,

    /// Rasterisation DPI for page images. Range 72–600. Default: 300.
    ///
    /// These are degraded multi-decade scans, often typewritten or
    /// handwritten; 300 DPI noticeably improves recognition over 150 at the
    /// cost of render time.
    pub dpi: u32,

    /// Cap on the longest rendered edge in pixels. Default: 2600.
    ///
    /// Independent safety net: an oversized ledger page at 300 DPI could
    /// otherwise allocate a 10k-pixel-wide bitmap.
    pub max_rendered_pixels: u32,

    /// Retry policy for the extraction and export adapters.
    pub retry: RetryPolicy,

    /// Per-adapter-call timeout. Default: 180s.
    ///
    /// Extraction of a dense month can take the LLM well over a minute;
    /// anything past three minutes is treated as a transient failure and
    /// retried.
    pub api_timeout: Duration,

    /// Character budget per extraction call. Default: 48_000.
    ///
    /// Periods whose combined page text exceeds this are chunked at page
    /// boundaries and extracted in consecutive calls; the merger rejoins
    /// them in page order.
    pub chunk_max_chars: usize,

    /// Concurrent period extractions. Default: 2.
    ///
    /// Periods are independent units of work, so they may overlap; pages
    /// *within* a period are always presented in order.
    pub concurrency: usize,

    /// Gemini API key for the bundled extraction adapter.
    pub gemini_api_key: Option<String>,

    /// Extraction model identifier. Default: `gemini-2.5-flash-lite`.
    pub model: String,

    /// Endpoint the bundled export adapter POSTs row batches to.
    pub export_url: Option<String>,

    /// Bearer token for the export endpoint.
    pub export_token: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/input"),
            data_dir: PathBuf::from("data"),
            rules: ScoringRules::default(),
            enable_extraction: true,
            enable_export: true,
            save_ocr_text: false,
            dpi: 300,
            max_rendered_pixels: 2600,
            retry: RetryPolicy::default(),
            api_timeout: Duration::from_secs(180),
            chunk_max_chars: 48_000,
            concurrency: 2,
            gemini_api_key: None,
            model: "gemini-2.5-flash-lite".to_string(),
            export_url: None,
            export_token: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("input_dir", &self.input_dir)
            .field("data_dir", &self.data_dir)
            .field("threshold", &self.rules.threshold)
            .field("keywords", &self.rules.keywords.len())
            .field("enable_extraction", &self.enable_extraction)
            .field("enable_export", &self.enable_export)
            .field("save_ocr_text", &self.save_ocr_text)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("retry", &self.retry)
            .field("api_timeout", &self.api_timeout)
            .field("chunk_max_chars", &self.chunk_max_chars)
            .field("concurrency", &self.concurrency)
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("export_url", &self.export_url)
            .field("export_token", &self.export_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn rules(mut self, rules: ScoringRules) -> Self {
        self.config.rules = rules;
        self
    }

    /// Shortcut: keep the default keyword set but change the threshold.
    pub fn keep_threshold(mut self, threshold: u32) -> Self {
        self.config.rules.threshold = threshold;
        self
    }

    pub fn enable_extraction(mut self, v: bool) -> Self {
        self.config.enable_extraction = v;
        self
    }

    pub fn enable_export(mut self, v: bool) -> Self {
        self.config.enable_export = v;
        self
    }

    pub fn save_ocr_text(mut self, v: bool) -> Self {
        self.config.save_ocr_text = v;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn api_timeout(mut self, timeout: Duration) -> Self {
        self.config.api_timeout = timeout;
        self
    }

    pub fn chunk_max_chars(mut self, n: usize) -> Self {
        self.config.chunk_max_chars = n.max(1_000);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn gemini_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.gemini_api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn export_url(mut self, url: impl Into<String>) -> Self {
        self.config.export_url = Some(url.into());
        self
    }

    pub fn export_token(mut self, token: impl Into<String>) -> Self {
        self.config.export_token = Some(token.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.rules.keywords.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Scoring keyword set must not be empty".into(),
            ));
        }
        let max_possible: u32 = c.rules.keywords.iter().map(|k| k.weight).sum();
        if c.rules.threshold > max_possible {
            return Err(PipelineError::InvalidConfig(format!(
                "Keep threshold {} exceeds the maximum possible score {}; every page would be discarded",
                c.rules.threshold, max_possible
            )));
        }
        if c.retry.max_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "Retry policy must allow at least one attempt".into(),
            ));
        }
        Ok(self.config)
    }
}
