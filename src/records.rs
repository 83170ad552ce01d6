//! Canonical record schema, extraction results, export rows, and run stats.
//!
//! The extraction adapter returns loosely-typed JSON ([`RawStormRecord`],
//! every field a [`Cell`] that tolerates strings and numbers alike). The
//! result merger normalises those into [`StormRecord`], where numeric fields
//! are real numbers and unparseable values are explicitly missing (`None`)
//! rather than zero. One [`ExtractionResult`] exists per reporting period
//! and is written exactly once.

use crate::document::PeriodKey;
use crate::error::StageFailure;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A raw field value from the extraction adapter.
///
/// LLMs are inconsistent about emitting `"3"` versus `3`; this type accepts
/// both (plus `null`) and presents them uniformly as a string for the merger
/// to repair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct Cell(pub String);

impl From<Value> for Cell {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Cell(String::new()),
            Value::String(s) => Cell(s),
            Value::Number(n) => Cell(n.to_string()),
            Value::Bool(b) => Cell(b.to_string()),
            other => Cell(other.to_string()),
        }
    }
}

impl Cell {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One record as returned by the extraction adapter, before normalisation.
///
/// Field names match the extraction prompt's JSON schema. Missing fields
/// deserialise to empty cells rather than failing the whole response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawStormRecord {
    #[serde(default)]
    pub state: Cell,
    #[serde(default)]
    pub place_or_location: Cell,
    #[serde(default)]
    pub date: Cell,
    #[serde(default)]
    pub time: Cell,
    #[serde(default)]
    pub path_length: Cell,
    #[serde(default)]
    pub path_width: Cell,
    #[serde(default)]
    pub killed: Cell,
    #[serde(default)]
    pub injured: Cell,
    #[serde(default)]
    pub property_damage_code: Cell,
    #[serde(default)]
    pub crop_damage_code: Cell,
    #[serde(default)]
    pub character_of_storm: Cell,
    #[serde(default)]
    pub description: Cell,
}

/// One normalised storm-report record.
///
/// Numeric fields are `None` when the source value was absent, `?`, `NR`,
/// or otherwise unparseable - never coerced to zero, which would be
/// indistinguishable from a reported zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StormRecord {
    pub state: String,
    pub location: String,
    /// Day of month (1–31) when parseable.
    pub date: Option<u8>,
    pub time: String,
    pub path_length: Option<f64>,
    pub path_width: Option<f64>,
    pub killed: Option<u64>,
    pub injured: Option<u64>,
    pub property_damage: Option<u64>,
    pub crop_damage: Option<u64>,
    pub character_of_storm: String,
    pub description: String,
}

impl StormRecord {
    /// Deduplication key: records agreeing on all three components are
    /// treated as the same event repeated across a chunk boundary.
    pub fn dedup_key(&self) -> (String, Option<u8>, String) {
        (
            self.location.trim().to_lowercase(),
            self.date,
            self.character_of_storm.trim().to_lowercase(),
        )
    }
}

/// The one structured output document for a reporting period.
///
/// Immutable once written; superseded only by re-running the period from
/// scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub period: PeriodKey,
    pub records: Vec<StormRecord>,
    /// Page identities (`<doc>#<index>`) that contributed, in the order
    /// they were presented to the extraction adapter.
    pub pages: Vec<String>,
}

impl ExtractionResult {
    /// Flatten into export rows following the canonical column order:
    /// `month, year, state, location, date, time, path_length, path_width,
    /// killed, injured, property_damage, crop_damage, character_of_storm,
    /// description, source_file, record_index`.
    ///
    /// Numbers are emitted as JSON numbers, missing values as `null`, so the
    /// destination never has to undo string-typed cells.
    pub fn to_rows(&self) -> Vec<Vec<Value>> {
        let month = self.period.month_title();
        self.records
            .iter()
            .enumerate()
            .map(|(idx, r)| {
                vec![
                    Value::from(month.clone()),
                    Value::from(self.period.year),
                    Value::from(r.state.clone()),
                    Value::from(r.location.clone()),
                    opt_num(r.date.map(u64::from)),
                    Value::from(r.time.clone()),
                    opt_f64(r.path_length),
                    opt_f64(r.path_width),
                    opt_num(r.killed),
                    opt_num(r.injured),
                    opt_num(r.property_damage),
                    opt_num(r.crop_damage),
                    Value::from(r.character_of_storm.clone()),
                    Value::from(r.description.clone()),
                    Value::from(format!("{}.json", self.period)),
                    Value::from(idx as u64 + 1),
                ]
            })
            .collect()
    }
}

fn opt_num(v: Option<u64>) -> Value {
    v.map(Value::from).unwrap_or(Value::Null)
}

fn opt_f64(v: Option<f64>) -> Value {
    v.map(Value::from).unwrap_or(Value::Null)
}

/// Counters for one pipeline run, printed at the end.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub documents_seen: usize,
    pub documents_failed: usize,
    pub pages_kept: usize,
    pub pages_discarded: usize,
    pub periods_extracted: usize,
    pub periods_failed: usize,
    pub periods_skipped: usize,
    pub rows_exported: usize,
    pub rows_pending: usize,
    /// Every non-fatal failure encountered, in occurrence order.
    pub failures: Vec<StageFailure>,
}

impl RunSummary {
    pub fn record_failure(&mut self, failure: StageFailure) {
        self.failures.push(failure);
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "documents: {} seen, {} failed",
            self.documents_seen, self.documents_failed
        )?;
        writeln!(
            f,
            "pages:     {} kept, {} discarded",
            self.pages_kept, self.pages_discarded
        )?;
        writeln!(
            f,
            "periods:   {} extracted, {} failed, {} skipped",
            self.periods_extracted, self.periods_failed, self.periods_skipped
        )?;
        write!(
            f,
            "rows:      {} exported, {} pending",
            self.rows_exported, self.rows_pending
        )?;
        if !self.failures.is_empty() {
            write!(f, "\nfailures:")?;
            for failure in &self.failures {
                write!(f, "\n  [{}] {}", failure.kind(), failure)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(location: &str, date: Option<u8>, storm: &str) -> StormRecord {
        StormRecord {
            state: "TX".into(),
            location: location.into(),
            date,
            time: "1430".into(),
            path_length: Some(2.0),
            path_width: None,
            killed: Some(0),
            injured: None,
            property_damage: Some(5),
            crop_damage: None,
            character_of_storm: storm.into(),
            description: "".into(),
        }
    }

    #[test]
    fn cell_accepts_strings_numbers_and_null() {
        let r: RawStormRecord =
            serde_json::from_value(serde_json::json!({
                "killed": 3,
                "injured": "12",
                "date": null,
            }))
            .unwrap();
        assert_eq!(r.killed.as_str(), "3");
        assert_eq!(r.injured.as_str(), "12");
        assert_eq!(r.date.as_str(), "");
        assert_eq!(r.state.as_str(), "");
    }

    #[test]
    fn dedup_key_ignores_case_and_whitespace() {
        let a = record("Lubbock ", Some(9), "Tornado");
        let b = record("lubbock", Some(9), "tornado");
        assert_eq!(a.dedup_key(), b.dedup_key());
        let c = record("Lubbock", Some(10), "Tornado");
        assert_ne!(a.dedup_key(), c.dedup_key());
    }

    #[test]
    fn rows_follow_canonical_column_order() {
        let result = ExtractionResult {
            period: PeriodKey::from_file_name("jan_1993.pdf").unwrap(),
            records: vec![record("Lubbock", Some(9), "Tornado")],
            pages: vec!["jan_1993.pdf#0".into()],
        };
        let rows = result.to_rows();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.len(), 16);
        assert_eq!(row[0], Value::from("Jan"));
        assert_eq!(row[1], Value::from(1993u16));
        assert_eq!(row[2], Value::from("TX"));
        assert_eq!(row[4], Value::from(9u64));
        // Missing numerics export as null, not 0 or "".
        assert_eq!(row[7], Value::Null);
        assert_eq!(row[14], Value::from("jan_1993.json"));
        assert_eq!(row[15], Value::from(1u64));
    }

    #[test]
    fn summary_display_lists_failures() {
        let mut s = RunSummary::default();
        s.pages_kept = 2;
        s.record_failure(StageFailure::UnrecognizedPeriod {
            doc: "notes.pdf".into(),
        });
        let text = s.to_string();
        assert!(text.contains("2 kept"));
        assert!(text.contains("unrecognized-period"));
        assert!(text.contains("notes.pdf"));
    }
}
