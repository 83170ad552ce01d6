//! Page scoring: OCR the page and classify it kept or discarded.
//!
//! The decision rule lives in [`crate::scoring`]; this stage wires it to
//! the OCR boundary. OCR failure is downgraded, never propagated: a page
//! that cannot be read is treated as non-informative and discarded, because
//! one ruined scan must not abort a batch of thousands.
//!
//! Scoring is idempotent - the same payload always yields the same score
//! and classification - so the runner is free to re-score a page whose
//! lifecycle transition did not commit.

use crate::document::PageClass;
use crate::ocr::OcrEngine;
use crate::scoring::ScoringRules;
use image::DynamicImage;
use tracing::{debug, warn};

/// Outcome of scoring one page.
#[derive(Debug, Clone)]
pub struct PageScore {
    /// Recognised text (empty when OCR failed).
    pub text: String,
    /// Aggregate keyword score.
    pub score: u32,
    /// The keywords that matched, for logs and debug text.
    pub matched: Vec<String>,
    pub class: PageClass,
}

impl PageScore {
    pub fn kept(&self) -> bool {
        self.class == PageClass::Kept
    }
}

/// OCR a page image and score the recognised text.
///
/// Blocking (OCR engines are subprocess- or CPU-bound); callers run this
/// inside `spawn_blocking`.
pub fn score_image(
    ocr: &dyn OcrEngine,
    image: &DynamicImage,
    rules: &ScoringRules,
) -> PageScore {
    let text = match ocr.recognize(image) {
        Ok(text) => text,
        Err(e) => {
            warn!("OCR failed, treating page as non-informative: {e}");
            String::new()
        }
    };
    score_text(text, rules)
}

/// Score already-recognised text. Pure.
pub fn score_text(text: String, rules: &ScoringRules) -> PageScore {
    if text.trim().is_empty() {
        return PageScore {
            text,
            score: 0,
            matched: Vec::new(),
            class: PageClass::Discarded,
        };
    }
    let (score, matched) = rules.score(&text);
    let class = if rules.keeps(score) {
        PageClass::Kept
    } else {
        PageClass::Discarded
    };
    debug!("page scored {score} ({} keywords) → {:?}", matched.len(), class);
    PageScore {
        text,
        score,
        matched: matched.into_iter().map(str::to_string).collect(),
        class,
    }
}
