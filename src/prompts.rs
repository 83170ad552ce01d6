//! Extraction prompt contract and ordered-text assembly.
//!
//! Centralising the prompt here keeps the adapter free of prompt
//! engineering and lets unit tests inspect the contract without a live LLM.
//!
//! Multi-page tables are the hard case: a storm event's row can start at the
//! bottom of one page and continue at the top of the next. The assembly
//! functions insert `--- PAGE N ---` separators between pages, and when the
//! continuation heuristics fire, `--- CONTINUED FROM PREVIOUS PAGE ---`
//! instead - the prompt instructs the model to merge such text into the
//! previous event rather than opening a new record.

use crate::scoring::ScoringRules;

/// Marker inserted before a page detected as a table continuation.
pub const CONTINUATION_MARKER: &str = "--- CONTINUED FROM PREVIOUS PAGE ---";

/// System prompt establishing the extraction task and the JSON schema.
pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are an expert extracting structured storm data from scanned NOAA storm reports.

IMPORTANT:
- When you see the marker '--- CONTINUED FROM PREVIOUS PAGE ---',
  that text is a continuation of the SAME storm event row.
  DO NOT create a new JSON entry for it; merge it into the previous event.

Extract only valid structured JSON of this exact shape:
{
  "storm_events": [
    {
      "state": "",
      "place_or_location": "",
      "date": "",
      "time": "",
      "path_length": "",
      "path_width": "",
      "killed": "",
      "injured": "",
      "property_damage_code": "",
      "crop_damage_code": "",
      "character_of_storm": "",
      "description": ""
    }
  ]
}

Output ONLY the JSON object. Do not wrap it in markdown fences and do not add commentary."#;

/// Build the full prompt for one extraction call.
pub fn build_extraction_prompt(period: &str, combined_text: &str) -> String {
    format!(
        "{EXTRACTION_SYSTEM_PROMPT}\n\nReporting period: {period}\nDocument text:\n{combined_text}"
    )
}

/// Heuristic: is the current page a direct continuation of the previous one?
///
/// Signals, in order of reliability:
/// 1. no table header keywords on the current page
/// 2. the page starts with a digit (row data, not a header)
/// 3. the page starts with a lowercase letter (mid-sentence)
/// 4. the previous page ends without sentence-final punctuation
pub fn is_continuation(curr_text: &str, prev_text: &str, rules: &ScoringRules) -> bool {
    let curr = curr_text.trim();
    let prev = prev_text.trim();
    if prev.is_empty() {
        return false;
    }

    let (score, _) = rules.score(curr);
    if score == 0 {
        return true;
    }
    match curr.chars().next() {
        Some(c) if c.is_ascii_digit() => return true,
        Some(c) if c.is_lowercase() => return true,
        _ => {}
    }
    !prev.ends_with(['.', ';', ':'])
}

/// Join ordered page texts with page/continuation markers.
///
/// `pages` must already be in continuation order - index here is only used
/// for the human-readable marker label. Empty pages are skipped.
pub fn combine_page_texts(pages: &[(usize, String)], rules: &ScoringRules) -> String {
    let mut combined: Vec<String> = Vec::with_capacity(pages.len());
    let mut prev_text = "";

    for (n, (index, text)) in pages.iter().enumerate() {
        if text.trim().is_empty() {
            continue;
        }
        if n > 0 && is_continuation(text, prev_text, rules) {
            combined.push(format!("{CONTINUATION_MARKER}\n{text}"));
        } else {
            combined.push(format!("--- PAGE {} ---\n{text}", index + 1));
        }
        prev_text = text;
    }

    combined.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> ScoringRules {
        ScoringRules::default()
    }

    const HEADER_PAGE: &str =
        "Place Date Time Path Killed Injured Damage Character of Storm.";

    #[test]
    fn first_page_is_never_a_continuation() {
        assert!(!is_continuation("4 killed near Waco", "", &rules()));
    }

    #[test]
    fn headerless_page_is_a_continuation() {
        assert!(is_continuation(
            "and the roof was carried half a mile.",
            HEADER_PAGE,
            &rules()
        ));
    }

    #[test]
    fn digit_start_is_a_continuation() {
        let curr = format!("3 injured. {HEADER_PAGE}");
        assert!(is_continuation(&curr, HEADER_PAGE, &rules()));
    }

    #[test]
    fn fresh_header_page_is_not_a_continuation() {
        // Headers present, starts uppercase, previous page ended a sentence.
        assert!(!is_continuation(HEADER_PAGE, HEADER_PAGE, &rules()));
    }

    #[test]
    fn unfinished_previous_page_flags_continuation() {
        let prev = "Storm data: Location Date Time Path damage to crops and";
        assert!(is_continuation(HEADER_PAGE, prev, &rules()));
    }

    #[test]
    fn combine_inserts_markers() {
        let pages = vec![
            (0usize, HEADER_PAGE.to_string()),
            (2usize, "and continued into the next county.".to_string()),
        ];
        let combined = combine_page_texts(&pages, &rules());
        assert!(combined.starts_with("--- PAGE 1 ---"));
        assert!(combined.contains(CONTINUATION_MARKER));
        assert!(!combined.contains("--- PAGE 3 ---"));
    }

    #[test]
    fn combine_skips_empty_pages() {
        let pages = vec![
            (0usize, HEADER_PAGE.to_string()),
            (1usize, "   ".to_string()),
            (2usize, HEADER_PAGE.to_string()),
        ];
        let combined = combine_page_texts(&pages, &rules());
        assert!(combined.contains("--- PAGE 1 ---"));
        assert!(combined.contains("--- PAGE 3 ---"));
        assert!(!combined.contains("--- PAGE 2 ---"));
    }

    #[test]
    fn prompt_names_the_period() {
        let p = build_extraction_prompt("jan_1993", "text");
        assert!(p.contains("jan_1993"));
        assert!(p.contains("storm_events"));
    }
}
