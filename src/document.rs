//! Core data model: source documents, pages, and reporting-period keys.
//!
//! A [`SourceDocument`] is one scanned multi-page PDF discovered in the input
//! directory. Splitting it yields one [`Page`] per physical page; the page
//! index is 0-based, unique within its document, and defines the total order
//! used to reconstruct tables that continue across pages. A [`PeriodKey`] is
//! derived from the document filename (`Jan_1993.pdf` → `jan_1993`) and
//! groups pages that belong to the same monthly report.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

/// One scanned source document discovered in the input area.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Original filename, e.g. `Jan_1993.pdf`. This is the document's
    /// identity for lifecycle tracking and encodes the period key.
    pub file_name: String,
    /// Absolute path at discovery time.
    pub path: PathBuf,
    /// Position in discovery order (0-based). Stable within a run and used
    /// as the cross-document tiebreak when two documents share a period.
    pub arrival: usize,
    /// When the document was found in the input area.
    pub discovered_at: SystemTime,
    /// Total physical page count, known after splitting.
    pub page_count: usize,
}

impl SourceDocument {
    /// Lower-cased stem with spaces collapsed to underscores, used as a
    /// directory name for this document's pages.
    pub fn slug(&self) -> String {
        let stem = self
            .file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.file_name);
        stem.replace(' ', "_").to_lowercase()
    }

    /// Derive the period key from this document's filename.
    pub fn period_key(&self) -> Option<PeriodKey> {
        PeriodKey::from_file_name(&self.file_name)
    }
}

/// Classification of a page after scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageClass {
    /// Not yet scored.
    Unscored,
    /// Relevance score met the threshold; the page proceeds to extraction.
    Kept,
    /// Below threshold (or unreadable); the page is set aside.
    Discarded,
}

/// One physical page of a source document.
///
/// Invariant: `index` is unique within the parent document and never changes
/// across the run.
#[derive(Debug, Clone)]
pub struct Page {
    /// Parent document filename.
    pub doc: String,
    /// Parent document arrival order.
    pub doc_arrival: usize,
    /// 0-based physical page index within the document.
    pub index: usize,
    /// Where the rendered page image lives on disk.
    pub image_path: PathBuf,
    /// Recognised text, populated by the scorer.
    pub text: String,
    /// Count of distinct scoring keywords matched.
    pub score: u32,
    /// Current classification.
    pub class: PageClass,
}

impl Page {
    /// Lifecycle identity: `<doc>#<index>`.
    pub fn id(&self) -> String {
        format!("{}#{}", self.doc, self.index)
    }
}

/// A derived `(month, year)` identifier grouping pages of one monthly report.
///
/// Always stored lower-case; `Jan_1993.pdf`, `JAN_1993.PDF`, and
/// `jan_1993_scan2.pdf` all map to `jan_1993`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeriodKey {
    /// Three-letter month abbreviation, lower-case (`jan` … `dec`).
    pub month: String,
    /// Four-digit year.
    pub year: u16,
}

static PERIOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*[_\- ](\d{4})\b")
        .expect("period regex is valid")
});

impl PeriodKey {
    /// Parse a period key from a document filename.
    ///
    /// Accepts the `<month-abbrev>_<year>` convention anywhere in the stem,
    /// case-insensitively, with `_`, `-`, or a space as the separator and
    /// full month names tolerated (`January_1993` → `jan_1993`). Returns
    /// `None` when no month/year pair is present - the caller reports the
    /// document as `UnrecognizedPeriod` instead of guessing.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
        let caps = PERIOD_RE.captures(stem)?;
        let month = caps[1].to_lowercase();
        let year: u16 = caps[2].parse().ok()?;
        Some(PeriodKey { month, year })
    }

    /// Capitalised month name for export rows (`jan` → `Jan`).
    pub fn month_title(&self) -> String {
        let mut c = self.month.chars();
        match c.next() {
            Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
            None => String::new(),
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.month, self.year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str) -> SourceDocument {
        SourceDocument {
            file_name: name.to_string(),
            path: PathBuf::from(name),
            arrival: 0,
            discovered_at: SystemTime::now(),
            page_count: 0,
        }
    }

    #[test]
    fn period_from_plain_convention() {
        let key = PeriodKey::from_file_name("Jan_1993.pdf").unwrap();
        assert_eq!(key.month, "jan");
        assert_eq!(key.year, 1993);
        assert_eq!(key.to_string(), "jan_1993");
    }

    #[test]
    fn period_is_case_insensitive() {
        assert_eq!(
            PeriodKey::from_file_name("OCT_1970.PDF"),
            PeriodKey::from_file_name("oct_1970.pdf")
        );
    }

    #[test]
    fn period_accepts_full_month_names_and_dashes() {
        let key = PeriodKey::from_file_name("January-1993.pdf").unwrap();
        assert_eq!(key.to_string(), "jan_1993");
    }

    #[test]
    fn period_rejects_unconventional_names() {
        assert!(PeriodKey::from_file_name("report-final.pdf").is_none());
        assert!(PeriodKey::from_file_name("scan_123.pdf").is_none());
        assert!(PeriodKey::from_file_name("1993.pdf").is_none());
    }

    #[test]
    fn month_title_capitalises() {
        let key = PeriodKey::from_file_name("mar_1955.pdf").unwrap();
        assert_eq!(key.month_title(), "Mar");
    }

    #[test]
    fn slug_lowercases_and_replaces_spaces() {
        assert_eq!(doc("Jan 1993 Scan.pdf").slug(), "jan_1993_scan");
        assert_eq!(doc("OCT_1970.pdf").slug(), "oct_1970");
    }

    #[test]
    fn page_id_combines_doc_and_index() {
        let p = Page {
            doc: "jan_1993.pdf".into(),
            doc_arrival: 0,
            index: 2,
            image_path: PathBuf::new(),
            text: String::new(),
            score: 0,
            class: PageClass::Unscored,
        };
        assert_eq!(p.id(), "jan_1993.pdf#2");
    }
}
