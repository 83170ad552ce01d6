//! Period grouping and continuation ordering.
//!
//! Kept pages are grouped by the period key derived from their parent
//! document's name, then ordered `(document arrival, page index)` within
//! each group. That ordering is the exact order presented to the extraction
//! adapter - reordering after this stage is never permitted, because
//! multi-page tables must be read top-to-bottom to reconstruct continuation
//! rows.
//!
//! Two documents sharing a period key (a reprocessed duplicate scan for the
//! same month) merge into one group, document arrival order breaking ties.
//! A document whose name yields no period key is excluded and reported as
//! `UnrecognizedPeriod`, never silently grouped under a wrong key.

use crate::document::{Page, PeriodKey};
use crate::error::StageFailure;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Group kept pages by period key and order each group for extraction.
///
/// Returns the groups plus one `UnrecognizedPeriod` failure per distinct
/// document that could not be keyed.
pub fn group_kept_pages(
    pages: Vec<Page>,
) -> (BTreeMap<PeriodKey, Vec<Page>>, Vec<StageFailure>) {
    let mut groups: BTreeMap<PeriodKey, Vec<Page>> = BTreeMap::new();
    let mut unrecognized: BTreeSet<String> = BTreeSet::new();

    for page in pages {
        match PeriodKey::from_file_name(&page.doc) {
            Some(key) => groups.entry(key).or_default().push(page),
            None => {
                unrecognized.insert(page.doc.clone());
            }
        }
    }

    for pages in groups.values_mut() {
        order_for_extraction(pages);
    }

    for (key, pages) in &groups {
        info!("period {key}: {} kept page(s)", pages.len());
    }

    let failures = unrecognized
        .into_iter()
        .map(|doc| StageFailure::UnrecognizedPeriod { doc })
        .collect();

    (groups, failures)
}

/// Deterministic total order for one period's pages:
/// `(document arrival, page index)`, ascending.
///
/// Page index is unique per document, so there are no ties.
pub fn order_for_extraction(pages: &mut [Page]) {
    pages.sort_by_key(|p| (p.doc_arrival, p.index));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PageClass;
    use std::path::PathBuf;

    fn page(doc: &str, arrival: usize, index: usize) -> Page {
        Page {
            doc: doc.to_string(),
            doc_arrival: arrival,
            index,
            image_path: PathBuf::new(),
            text: String::new(),
            score: 7,
            class: PageClass::Kept,
        }
    }

    #[test]
    fn single_document_order_equals_page_index_order() {
        let mut pages = vec![
            page("jan_1993.pdf", 0, 2),
            page("jan_1993.pdf", 0, 0),
            page("jan_1993.pdf", 0, 1),
        ];
        order_for_extraction(&mut pages);
        let indices: Vec<usize> = pages.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn groups_form_per_period() {
        let (groups, failures) = group_kept_pages(vec![
            page("jan_1993.pdf", 0, 0),
            page("feb_1993.pdf", 1, 0),
            page("jan_1993.pdf", 0, 1),
        ]);
        assert!(failures.is_empty());
        assert_eq!(groups.len(), 2);
        let jan = PeriodKey::from_file_name("jan_1993.pdf").unwrap();
        assert_eq!(groups[&jan].len(), 2);
    }

    #[test]
    fn colliding_documents_merge_arrival_order_first() {
        // Two scans of the same month: arrival order is the tiebreak, and
        // each document's own pages stay in index order.
        let (groups, _) = group_kept_pages(vec![
            page("jan_1993_rescan.pdf", 3, 0),
            page("jan_1993.pdf", 1, 1),
            page("jan_1993.pdf", 1, 0),
            page("jan_1993_rescan.pdf", 3, 1),
        ]);
        let jan = PeriodKey::from_file_name("jan_1993.pdf").unwrap();
        let order: Vec<(usize, usize)> =
            groups[&jan].iter().map(|p| (p.doc_arrival, p.index)).collect();
        assert_eq!(order, vec![(1, 0), (1, 1), (3, 0), (3, 1)]);
    }

    #[test]
    fn unrecognized_documents_are_reported_not_grouped() {
        let (groups, failures) = group_kept_pages(vec![
            page("jan_1993.pdf", 0, 0),
            page("misc-notes.pdf", 1, 0),
            page("misc-notes.pdf", 1, 1),
        ]);
        assert_eq!(groups.len(), 1);
        // One failure per document, not per page.
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            &failures[0],
            StageFailure::UnrecognizedPeriod { doc } if doc == "misc-notes.pdf"
        ));
    }

    #[test]
    fn concatenation_preserves_single_document_order() {
        // Invariant: for any single contributing document, the group's
        // sequence restricted to that document reproduces its page order.
        let (groups, _) = group_kept_pages(vec![
            page("jan_1993.pdf", 0, 4),
            page("jan_1993_b.pdf", 1, 1),
            page("jan_1993.pdf", 0, 0),
            page("jan_1993_b.pdf", 1, 0),
            page("jan_1993.pdf", 0, 2),
        ]);
        let jan = PeriodKey::from_file_name("jan_1993.pdf").unwrap();
        let a_indices: Vec<usize> = groups[&jan]
            .iter()
            .filter(|p| p.doc == "jan_1993.pdf")
            .map(|p| p.index)
            .collect();
        assert_eq!(a_indices, vec![0, 2, 4]);
    }
}
