use std::collections::BTreeMap;

use crate::models::{
    CanonicalStatus, DocStatus, IncidentRecord, KpiDelta, KpiSummary, CATEGORY_CALLOUT,
    CATEGORY_EARLY_DEPARTURE,
};
use crate::status;

/// Categories whose incidents expect supporting documentation.
pub const DOC_REQUIRED_CATEGORIES: [&str; 2] = [CATEGORY_CALLOUT, CATEGORY_EARLY_DEPARTURE];

pub fn requires_docs(record: &IncidentRecord) -> bool {
    DOC_REQUIRED_CATEGORIES
        .iter()
        .any(|slug| record.is_category(slug))
}

pub fn aggregate(records: &[IncidentRecord]) -> KpiSummary {
    let mut summary = KpiSummary::default();

    for record in records {
        match status::canonical_status(record) {
            CanonicalStatus::Void => continue,
            CanonicalStatus::Open => summary.open += 1,
            CanonicalStatus::Closed => summary.closed += 1,
        }
        summary.total += 1;

        let slug = record.category_slug.trim().to_ascii_lowercase();
        *summary.category_counts.entry(slug).or_insert(0) += 1;

        if requires_docs(record) {
            match record.doc_status {
                Some(DocStatus::Provided) => summary.docs_provided += 1,
                Some(DocStatus::NotProvided) => summary.docs_not_provided += 1,
                Some(DocStatus::Pending) => summary.docs_pending += 1,
                None => {}
            }
        }

        summary.breach_total = summary
            .breach_total
            .saturating_add(record.breach_days.unwrap_or(0));
    }

    summary.breach_average = if summary.total == 0 {
        0.0
    } else {
        f64::from(summary.breach_total) / f64::from(summary.total)
    };

    summary
}

/// Field-wise `current - previous`.
pub fn delta(current: &KpiSummary, previous: &KpiSummary) -> KpiDelta {
    let diff = |a: u32, b: u32| i64::from(a) - i64::from(b);

    let mut category_counts = BTreeMap::new();
    for slug in current
        .category_counts
        .keys()
        .chain(previous.category_counts.keys())
    {
        category_counts
            .entry(slug.clone())
            .or_insert_with(|| diff(current.category(slug), previous.category(slug)));
    }

    KpiDelta {
        total: diff(current.total, previous.total),
        open: diff(current.open, previous.open),
        closed: diff(current.closed, previous.closed),
        category_counts,
        docs_provided: diff(current.docs_provided, previous.docs_provided),
        docs_not_provided: diff(current.docs_not_provided, previous.docs_not_provided),
        docs_pending: diff(current.docs_pending, previous.docs_pending),
        breach_total: diff(current.breach_total, previous.breach_total),
        breach_average: current.breach_average - previous.breach_average,
    }
}
