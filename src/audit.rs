use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tracing::{info, warn};

use crate::models::{AuditRow, AuditViewRow, AuditWeekly, AuditWeeklyBucket, ShiftBucket};
use crate::store::IncidentStore;

pub const PASS_CUTOFF: f64 = 90.0;
pub const CONDITIONAL_CUTOFF: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSource {
    View,
    Raw,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    Pass,
    Conditional,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditLoad {
    pub weekly: AuditWeekly,
    pub source: AuditSource,
    /// Why the precomputed view was not used, if it failed.
    pub view_error: Option<String>,
    /// Set when neither source could be read.
    pub error: Option<String>,
}

/// Load the week's audit buckets from the precomputed view, rebuilding them
/// from raw audit rows when the view is unavailable or empty.
pub async fn load_weekly<S>(store: &S, week_start: NaiveDate) -> AuditLoad
where
    S: IncidentStore + ?Sized,
{
    let view_error = match store.query_weekly_audit_view(week_start).await {
        Ok(rows) if !rows.is_empty() => {
            return AuditLoad {
                weekly: from_view(week_start, &rows),
                source: AuditSource::View,
                view_error: None,
                error: None,
            };
        }
        Ok(_) => {
            info!(%week_start, "audit view has no rows, rebuilding from raw audits");
            None
        }
        Err(err) => {
            warn!(%week_start, error = %err, "audit view unavailable, rebuilding from raw audits");
            Some(err.to_string())
        }
    };

    match store.query_raw_audits(week_start).await {
        Ok(rows) => AuditLoad {
            weekly: from_raw(week_start, &rows),
            source: AuditSource::Raw,
            view_error,
            error: None,
        },
        Err(err) => {
            warn!(%week_start, error = %err, "raw audits unavailable");
            AuditLoad {
                weekly: AuditWeekly::default(),
                source: AuditSource::Unavailable,
                view_error,
                error: Some(err.to_string()),
            }
        }
    }
}

fn parse_bucket(value: &str) -> Option<ShiftBucket> {
    match value.trim().to_ascii_lowercase().as_str() {
        "all" => Some(ShiftBucket::All),
        "day" => Some(ShiftBucket::Day),
        "night" => Some(ShiftBucket::Night),
        _ => None,
    }
}

fn count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn round_pct(value: f64) -> u32 {
    value.round().max(0.0) as u32
}

pub fn pass_rate(passes: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    round_pct(f64::from(passes) / f64::from(total) * 100.0)
}

pub fn from_view(week_start: NaiveDate, rows: &[AuditViewRow]) -> AuditWeekly {
    let mut weekly = AuditWeekly::default();

    for row in rows.iter().filter(|row| row.week_start == week_start) {
        let Some(bucket) = parse_bucket(&row.shift_bucket) else {
            continue;
        };
        let total = count(row.total);
        let passes = count(row.passes);
        let mapped = AuditWeeklyBucket {
            total,
            passes,
            conditionals: count(row.conditionals),
            fails: count(row.fails),
            pass_rate: row
                .pass_rate
                .map(round_pct)
                .unwrap_or_else(|| pass_rate(passes, total)),
            avg_score_pct: row.avg_score_pct.map(round_pct),
        };
        let slot = match bucket {
            ShiftBucket::All => &mut weekly.all,
            ShiftBucket::Day => &mut weekly.day,
            ShiftBucket::Night => &mut weekly.night,
        };
        *slot = Some(mapped);
    }

    weekly
}

/// Explicit status first, score cutoffs otherwise. A row with neither is
/// graded as a fail.
pub fn grade(row: &AuditRow) -> Grade {
    let explicit = row
        .status
        .as_deref()
        .map(|status| status.trim().to_ascii_lowercase());
    match explicit.as_deref() {
        Some("pass") => return Grade::Pass,
        Some("conditional") => return Grade::Conditional,
        Some("fail") => return Grade::Fail,
        _ => {}
    }

    match row.score {
        Some(score) if score >= PASS_CUTOFF => Grade::Pass,
        Some(score) if score >= CONDITIONAL_CUTOFF => Grade::Conditional,
        _ => Grade::Fail,
    }
}

/// Shift a raw audit lands in besides `all`. Unknown shifts count as day.
pub fn shift_bucket(row: &AuditRow) -> ShiftBucket {
    match row.shift.as_deref().and_then(parse_bucket) {
        Some(ShiftBucket::Night) => ShiftBucket::Night,
        _ => ShiftBucket::Day,
    }
}

#[derive(Debug, Default)]
struct Tally {
    total: u32,
    passes: u32,
    conditionals: u32,
    fails: u32,
    score_sum: f64,
    scored: u32,
}

impl Tally {
    fn add(&mut self, row: &AuditRow) {
        self.total += 1;
        match grade(row) {
            Grade::Pass => self.passes += 1,
            Grade::Conditional => self.conditionals += 1,
            Grade::Fail => self.fails += 1,
        }
        if let Some(score) = row.score.filter(|score| score.is_finite()) {
            self.score_sum += score;
            self.scored += 1;
        }
    }

    /// A bucket without rows is absent, as it is in the view.
    fn finish(self) -> Option<AuditWeeklyBucket> {
        if self.total == 0 {
            return None;
        }
        Some(AuditWeeklyBucket {
            total: self.total,
            passes: self.passes,
            conditionals: self.conditionals,
            fails: self.fails,
            pass_rate: pass_rate(self.passes, self.total),
            avg_score_pct: (self.scored > 0)
                .then(|| round_pct(self.score_sum / f64::from(self.scored))),
        })
    }
}

/// Rebuild the week's buckets from raw audits. Rows dated outside the week
/// and repeated audit ids are skipped.
pub fn from_raw(week_start: NaiveDate, rows: &[AuditRow]) -> AuditWeekly {
    let week_end = week_start + Duration::days(7);
    let mut seen = HashSet::new();
    let mut all = Tally::default();
    let mut day = Tally::default();
    let mut night = Tally::default();

    for row in rows {
        if row.audited_on < week_start || row.audited_on >= week_end || !seen.insert(row.id) {
            continue;
        }
        all.add(row);
        match shift_bucket(row) {
            ShiftBucket::Night => night.add(row),
            _ => day.add(row),
        }
    }

    AuditWeekly {
        all: all.finish(),
        day: day.finish(),
        night: night.finish(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use uuid::Uuid;

    fn week() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 9).expect("valid date")
    }

    fn audit(shift: Option<&str>, score: Option<f64>, status: Option<&str>) -> AuditRow {
        AuditRow {
            id: Uuid::new_v4(),
            audited_on: week(),
            shift: shift.map(str::to_string),
            score,
            status: status.map(str::to_string),
        }
    }

    fn view_row(bucket: &str, totals: [i64; 4], pass_rate: f64, avg: Option<f64>) -> AuditViewRow {
        AuditViewRow {
            week_start: week(),
            shift_bucket: bucket.to_string(),
            total: totals[0],
            passes: totals[1],
            conditionals: totals[2],
            fails: totals[3],
            pass_rate: Some(pass_rate),
            avg_score_pct: avg,
        }
    }

    fn raw_rows() -> Vec<AuditRow> {
        vec![
            audit(Some("day"), Some(95.0), None),
            audit(Some("Night"), Some(85.0), None),
            audit(Some("swing"), Some(70.0), None),
            audit(None, None, Some("pass")),
            audit(Some("night"), Some(89.5), Some("fail")),
        ]
    }

    #[test]
    fn grades_use_status_then_cutoffs() {
        assert_eq!(grade(&audit(None, Some(90.0), None)), Grade::Pass);
        assert_eq!(grade(&audit(None, Some(89.9), None)), Grade::Conditional);
        assert_eq!(grade(&audit(None, Some(80.0), None)), Grade::Conditional);
        assert_eq!(grade(&audit(None, Some(79.9), None)), Grade::Fail);
        assert_eq!(grade(&audit(None, Some(99.0), Some("Fail"))), Grade::Fail);
        assert_eq!(grade(&audit(None, Some(50.0), Some("unknown"))), Grade::Fail);
        assert_eq!(grade(&audit(None, None, None)), Grade::Fail);
    }

    #[test]
    fn raw_rows_accumulate_into_shift_buckets() {
        let weekly = from_raw(week(), &raw_rows());

        let all = weekly.all.expect("all bucket");
        assert_eq!(all.total, 5);
        assert_eq!((all.passes, all.conditionals, all.fails), (2, 1, 2));
        assert_eq!(all.pass_rate, 40);
        // (95 + 85 + 70 + 89.5) / 4 = 84.875
        assert_eq!(all.avg_score_pct, Some(85));

        let day = weekly.day.expect("day bucket");
        assert_eq!(day.total, 3);
        assert_eq!(day.pass_rate, 67);
        assert_eq!(day.avg_score_pct, Some(83));

        let night = weekly.night.expect("night bucket");
        assert_eq!(night.total, 2);
        assert_eq!((night.passes, night.conditionals, night.fails), (0, 1, 1));
        assert_eq!(night.pass_rate, 0);
    }

    #[test]
    fn empty_raw_week_has_no_buckets() {
        assert_eq!(from_raw(week(), &[]), AuditWeekly::default());
    }

    #[test]
    fn unscored_rows_have_no_average() {
        let weekly = from_raw(week(), &[audit(Some("day"), None, Some("pass"))]);
        let all = weekly.all.expect("all bucket");
        assert_eq!(all.pass_rate, 100);
        assert_eq!(all.avg_score_pct, None);
    }

    #[test]
    fn raw_rows_outside_week_or_repeated_are_skipped() {
        let kept = audit(Some("day"), Some(95.0), None);
        let mut late = audit(Some("day"), Some(40.0), None);
        late.audited_on = week() + Duration::days(7);
        let mut early = audit(Some("night"), Some(40.0), None);
        early.audited_on = week() - Duration::days(1);

        let weekly = from_raw(week(), &[kept.clone(), kept, late, early]);
        let all = weekly.all.expect("all bucket");
        assert_eq!(all.total, 1);
        assert_eq!(all.pass_rate, 100);
        assert!(weekly.night.is_none());
    }

    #[test]
    fn view_rows_for_other_weeks_are_ignored() {
        let mut stale = view_row("night", [1, 1, 0, 0], 100.0, Some(95.0));
        stale.week_start = week() - Duration::days(7);
        let weekly = from_view(week(), &[view_row("all", [1, 1, 0, 0], 100.0, None), stale]);

        assert!(weekly.all.is_some());
        assert!(weekly.night.is_none());
    }

    #[tokio::test]
    async fn view_rows_are_used_when_present() {
        let store = MemoryStore {
            audit_view: vec![view_row("all", [4, 3, 1, 0], 75.0, Some(91.2))],
            ..MemoryStore::default()
        };
        let load = load_weekly(&store, week()).await;

        assert_eq!(load.source, AuditSource::View);
        assert_eq!(load.weekly.all.as_ref().map(|b| b.avg_score_pct), Some(Some(91)));
        assert!(load.weekly.day.is_none());
        assert!(load.weekly.night.is_none());
        assert_eq!(store.raw_audit_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_view_falls_back_to_identical_numbers() {
        let raw_store = MemoryStore {
            raw_audits: raw_rows(),
            ..MemoryStore::default()
        };
        let fallback = load_weekly(&raw_store, week()).await;
        assert_eq!(fallback.source, AuditSource::Raw);
        assert!(fallback.view_error.is_none());

        let view_store = MemoryStore {
            audit_view: vec![
                view_row("all", [5, 2, 1, 2], 40.0, Some(84.875)),
                view_row("day", [3, 2, 0, 1], 200.0 / 3.0, Some(82.5)),
                view_row("night", [2, 0, 1, 1], 0.0, Some(87.25)),
            ],
            ..MemoryStore::default()
        };
        let precomputed = load_weekly(&view_store, week()).await;
        assert_eq!(precomputed.source, AuditSource::View);

        assert_eq!(fallback.weekly, precomputed.weekly);
    }

    #[tokio::test]
    async fn week_without_night_audits_has_same_shape_on_both_paths() {
        let day_only = vec![
            audit(Some("day"), Some(92.0), None),
            audit(None, Some(81.0), None),
        ];
        let raw_store = MemoryStore {
            raw_audits: day_only,
            ..MemoryStore::default()
        };
        let fallback = load_weekly(&raw_store, week()).await;
        assert_eq!(fallback.source, AuditSource::Raw);

        let view_store = MemoryStore {
            audit_view: vec![
                view_row("all", [2, 1, 1, 0], 50.0, Some(86.5)),
                view_row("day", [2, 1, 1, 0], 50.0, Some(86.5)),
            ],
            ..MemoryStore::default()
        };
        let precomputed = load_weekly(&view_store, week()).await;
        assert_eq!(precomputed.source, AuditSource::View);

        assert!(fallback.weekly.night.is_none());
        assert_eq!(fallback.weekly, precomputed.weekly);
    }

    #[tokio::test]
    async fn missing_view_relation_falls_back() {
        let store = MemoryStore {
            audit_view_missing: true,
            raw_audits: raw_rows(),
            ..MemoryStore::default()
        };
        let load = load_weekly(&store, week()).await;

        assert_eq!(load.source, AuditSource::Raw);
        assert!(load.error.is_none());
        assert!(load
            .view_error
            .as_deref()
            .is_some_and(|err| err.contains("relation does not exist")));
        assert_eq!(load.weekly.all.map(|b| b.total), Some(5));
    }

    #[tokio::test]
    async fn both_sources_failing_reports_error_with_empty_buckets() {
        let store = MemoryStore {
            audit_view_error: Some("timeout".to_string()),
            raw_audits_error: Some("timeout".to_string()),
            ..MemoryStore::default()
        };
        let load = load_weekly(&store, week()).await;

        assert_eq!(load.source, AuditSource::Unavailable);
        assert_eq!(load.weekly, AuditWeekly::default());
        assert_eq!(load.error.as_deref(), Some("fetch failed: timeout"));
    }
}
