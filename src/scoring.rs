use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::models::{
    CanonicalStatus, DocStatus, GuardWeeklySummary, IncidentRecord, CATEGORY_CALLOUT,
    CATEGORY_EARLY_DEPARTURE,
};
use crate::status;

pub const CALLOUT_WEIGHT: u32 = 3;
pub const EARLY_DEPARTURE_WEIGHT: u32 = 2;
pub const OPEN_WEIGHT: u32 = 2;
pub const DOCS_WEIGHT: u32 = 2;
pub const BREACH_DAY_WEIGHT: u32 = 1;

/// Summarize one guard's incidents for one window. Returns `None` when no
/// non-void incident is left, so empty guards never produce a row.
pub fn score_guard(records: &[IncidentRecord]) -> Option<GuardWeeklySummary> {
    let mut summary: Option<GuardWeeklySummary> = None;

    for record in records {
        let canonical = status::canonical_status(record);
        if canonical == CanonicalStatus::Void {
            continue;
        }

        let entry = summary.get_or_insert_with(|| GuardWeeklySummary {
            guard_key: record.guard_key(),
            guard_name: record.guard_name.trim().to_string(),
            incident_count: 0,
            callout_count: 0,
            early_departure_count: 0,
            open_count: 0,
            docs_missing_or_pending: 0,
            breach_days: 0,
            score: 0,
        });

        entry.incident_count += 1;
        if record.is_category(CATEGORY_CALLOUT) {
            entry.callout_count += 1;
        }
        if record.is_category(CATEGORY_EARLY_DEPARTURE) {
            entry.early_departure_count += 1;
        }
        if canonical == CanonicalStatus::Open {
            entry.open_count += 1;
        }
        // Any unresolved documentation counts, whatever the category.
        if record.doc_status != Some(DocStatus::Provided) {
            entry.docs_missing_or_pending += 1;
        }
        entry.breach_days = entry
            .breach_days
            .saturating_add(record.breach_days.unwrap_or(0));
    }

    summary.map(|mut summary| {
        summary.score = composite_score(&summary);
        summary
    })
}

/// Saturates at `u32::MAX` instead of wrapping on extreme breach counts.
pub fn composite_score(summary: &GuardWeeklySummary) -> u32 {
    [
        (CALLOUT_WEIGHT, summary.callout_count),
        (EARLY_DEPARTURE_WEIGHT, summary.early_departure_count),
        (OPEN_WEIGHT, summary.open_count),
        (DOCS_WEIGHT, summary.docs_missing_or_pending),
        (BREACH_DAY_WEIGHT, summary.breach_days),
    ]
    .iter()
    .fold(0u32, |score, (weight, count)| {
        score.saturating_add(weight.saturating_mul(*count))
    })
}

/// Group records by guard, score each guard and rank them.
pub fn score_guards(records: &[IncidentRecord]) -> Vec<GuardWeeklySummary> {
    let mut scores: Vec<GuardWeeklySummary> = group_by_guard(records)
        .into_values()
        .filter_map(|group| score_guard(&group))
        .collect();

    scores.sort_by(rank_order);
    scores
}

pub fn group_by_guard(records: &[IncidentRecord]) -> BTreeMap<String, Vec<IncidentRecord>> {
    let mut groups: BTreeMap<String, Vec<IncidentRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.guard_key())
            .or_default()
            .push(record.clone());
    }
    groups
}

/// Score descending, then guard name ascending.
pub fn rank_order(a: &GuardWeeklySummary, b: &GuardWeeklySummary) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.guard_name.cmp(&b.guard_name))
        .then_with(|| a.guard_key.cmp(&b.guard_key))
}
