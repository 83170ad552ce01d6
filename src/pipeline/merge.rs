//! Result merging: raw adapter records → one normalised record set.
//!
//! Chunked extraction responses are concatenated in page order, then each
//! record is repaired:
//!
//! * numeric fields - strip spreadsheet-escape apostrophes and other
//!   decoration, take the first numeric run; `?`, `NR`, and anything
//!   unparseable become explicitly missing (`None`), never zero, because a
//!   fabricated zero is indistinguishable from a reported zero downstream;
//! * date fields - multi-day spans like `09-12` reduce to the first day,
//!   capped at two digits, and must land in 1–31;
//! * duplicates - records agreeing on (location, date, character of storm)
//!   across a chunk boundary collapse to the first occurrence, preserving
//!   page order.

use crate::records::{RawStormRecord, StormRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

static RE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("number regex is valid"));
static RE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digits regex is valid"));

/// NOAA unknown-value markers that mean "missing", not "zero".
fn is_missing_marker(s: &str) -> bool {
    matches!(s, "" | "?" | "NR" | "nr" | "N/R" | "unknown" | "Unknown")
}

/// Strip the leading apostrophe some sources use to force text mode.
fn strip_decoration(raw: &str) -> &str {
    raw.trim().trim_start_matches('\'')
}

/// Repair a numeric field: first numeric run as `f64`, or `None`.
pub fn clean_number(raw: &str) -> Option<f64> {
    let s = strip_decoration(raw);
    if is_missing_marker(s) {
        return None;
    }
    RE_NUMBER.find(s)?.as_str().parse().ok()
}

/// Repair an integer count/code field: first digit run, or `None`.
pub fn clean_count(raw: &str) -> Option<u64> {
    let s = strip_decoration(raw);
    if is_missing_marker(s) {
        return None;
    }
    RE_DIGITS.find(s)?.as_str().parse().ok()
}

/// Repair a date field to a day of month: first digit run, truncated to
/// two digits, accepted only in 1–31.
pub fn clean_day(raw: &str) -> Option<u8> {
    let s = strip_decoration(raw);
    if is_missing_marker(s) {
        return None;
    }
    let digits = RE_DIGITS.find(s)?.as_str();
    let head = &digits[..digits.len().min(2)];
    let day: u8 = head.parse().ok()?;
    (1..=31).contains(&day).then_some(day)
}

/// Normalise one raw record.
pub fn normalize(raw: &RawStormRecord) -> StormRecord {
    StormRecord {
        state: raw.state.as_str().trim().to_string(),
        location: raw.place_or_location.as_str().trim().to_string(),
        date: clean_day(raw.date.as_str()),
        time: raw.time.as_str().trim().to_string(),
        path_length: clean_number(raw.path_length.as_str()),
        path_width: clean_number(raw.path_width.as_str()),
        killed: clean_count(raw.killed.as_str()),
        injured: clean_count(raw.injured.as_str()),
        property_damage: clean_count(raw.property_damage_code.as_str()),
        crop_damage: clean_count(raw.crop_damage_code.as_str()),
        character_of_storm: raw.character_of_storm.as_str().trim().to_string(),
        description: raw.description.as_str().trim().to_string(),
    }
}

/// Concatenate chunk outputs in order, normalise, and dedupe.
///
/// The first occurrence of each dedup key wins, so unique records keep
/// their original page order.
pub fn merge_records(chunks: Vec<Vec<RawStormRecord>>) -> Vec<StormRecord> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for chunk in chunks {
        for raw in &chunk {
            let record = normalize(raw);
            if seen.insert(record.dedup_key()) {
                merged.push(record);
            } else {
                debug!("dropping duplicate record for {:?}", record.dedup_key());
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Cell;

    fn raw(location: &str, date: &str, storm: &str) -> RawStormRecord {
        RawStormRecord {
            place_or_location: Cell(location.into()),
            date: Cell(date.into()),
            character_of_storm: Cell(storm.into()),
            ..Default::default()
        }
    }

    #[test]
    fn numbers_strip_decoration() {
        assert_eq!(clean_number("'12"), Some(12.0));
        assert_eq!(clean_number("  3.5 miles "), Some(3.5));
        assert_eq!(clean_count("about 200 yards"), Some(200));
    }

    #[test]
    fn missing_markers_stay_missing_not_zero() {
        for marker in ["?", "NR", "", "  "] {
            assert_eq!(clean_count(marker), None, "marker {marker:?}");
            assert_eq!(clean_number(marker), None, "marker {marker:?}");
            assert_eq!(clean_day(marker), None, "marker {marker:?}");
        }
        assert_eq!(clean_count("none reported"), None);
    }

    #[test]
    fn day_takes_first_chunk_of_a_span() {
        assert_eq!(clean_day("09-12"), Some(9));
        assert_eq!(clean_day("'09-12"), Some(9));
        assert_eq!(clean_day("23"), Some(23));
        assert_eq!(clean_day("41"), None);
        assert_eq!(clean_day("0"), None);
    }

    #[test]
    fn normalize_trims_text_fields() {
        let mut r = raw(" Waco ", "9", " Tornado ");
        r.state = Cell(" TX ".into());
        let n = normalize(&r);
        assert_eq!(n.location, "Waco");
        assert_eq!(n.state, "TX");
        assert_eq!(n.date, Some(9));
    }

    #[test]
    fn normalize_never_invents_zero() {
        let mut r = raw("Waco", "9", "Hail");
        r.killed = Cell("?".into());
        r.injured = Cell("NR".into());
        let n = normalize(&r);
        assert_eq!(n.killed, None);
        assert_eq!(n.injured, None);
    }

    #[test]
    fn merge_dedupes_across_chunk_boundary() {
        // Two chunk responses, one overlapping duplicate: the record that
        // straddles the boundary appears in both.
        let chunk_a = vec![raw("Waco", "9", "Tornado"), raw("Lubbock", "10", "Hail")];
        let chunk_b = vec![raw("Lubbock", "10", "Hail"), raw("Amarillo", "11", "Wind")];
        let merged = merge_records(vec![chunk_a, chunk_b]);
        let locations: Vec<&str> = merged.iter().map(|r| r.location.as_str()).collect();
        assert_eq!(locations, vec!["Waco", "Lubbock", "Amarillo"]);
    }

    #[test]
    fn distinct_records_survive_merge_in_order() {
        let merged = merge_records(vec![
            vec![raw("A", "1", "Tornado")],
            vec![raw("A", "2", "Tornado"), raw("A", "1", "Hail")],
        ]);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn dedup_is_case_insensitive() {
        let merged = merge_records(vec![
            vec![raw("Waco", "9", "Tornado")],
            vec![raw("WACO", "9", "TORNADO")],
        ]);
        assert_eq!(merged.len(), 1);
    }
}
