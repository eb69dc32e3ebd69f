use std::fmt::Write;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::audit::{self, AuditSource};
use crate::fetch::{self, FetchedWindow, VoidColumn};
use crate::kpi;
use crate::models::{
    AuditWeekly, AuditWeeklyBucket, GuardAlert, GuardWeeklySummary, IncidentRecord, KpiDelta,
    KpiSummary,
};
use crate::scoring;
use crate::store::{IncidentStore, StoreError};
use crate::trend;
use crate::window::{self, ReportWindows, DEFAULT_HISTORY_WEEKS};

/// State carried between reports in one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSession {
    pub void_column: VoidColumn,
    pub history_weeks: u32,
}

impl Default for ReportSession {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WEEKS)
    }
}

impl ReportSession {
    pub fn new(history_weeks: u32) -> Self {
        Self {
            void_column: VoidColumn::Unknown,
            history_weeks: window::clamp_history_weeks(history_weeks),
        }
    }

    fn absorb(&mut self, result: &Result<FetchedWindow, StoreError>) {
        if let Ok(fetched) = result {
            self.void_column = self.void_column.merge(fetched.void_column);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyReport {
    pub windows: ReportWindows,
    pub kpi: KpiSummary,
    pub previous_kpi: KpiSummary,
    pub kpi_delta: KpiDelta,
    pub guard_scores: Vec<GuardWeeklySummary>,
    pub alerts: Vec<GuardAlert>,
    pub audits: AuditWeekly,
    pub audit_source: AuditSource,
    pub audit_error: Option<String>,
    pub incident_error: Option<String>,
    pub previous_error: Option<String>,
    pub history_error: Option<String>,
}

/// Ranked guard scores for an arbitrary set of incidents.
pub fn get_guard_scores(records: &[IncidentRecord]) -> Vec<GuardWeeklySummary> {
    scoring::score_guards(records)
}

/// Score each guard separately for every week of the historical window.
pub fn history_scores(
    windows: &ReportWindows,
    records: &[IncidentRecord],
) -> Vec<Vec<GuardWeeklySummary>> {
    let mut weeks: Vec<Vec<IncidentRecord>> = vec![Vec::new(); windows.history_weeks as usize];
    for record in records {
        if let Some(slot) = windows.history_slot(record.occurred_at) {
            if let Some(week) = weeks.get_mut(slot) {
                week.push(record.clone());
            }
        }
    }
    weeks.iter().map(|week| scoring::score_guards(week)).collect()
}

fn split(result: Result<FetchedWindow, StoreError>, label: &str) -> (Vec<IncidentRecord>, Option<String>) {
    match result {
        Ok(fetched) => (fetched.records, None),
        Err(err) => {
            warn!(window = label, error = %err, "incident window unavailable");
            (Vec::new(), Some(err.to_string()))
        }
    }
}

/// Build the weekly report starting at `week_start`. Each of the four reads
/// fails on its own; a failed section is left empty and its error recorded.
pub async fn get_weekly_report<S>(
    store: &S,
    session: &mut ReportSession,
    week_start: NaiveDate,
) -> WeeklyReport
where
    S: IncidentStore + ?Sized,
{
    let windows = ReportWindows::for_week(week_start, session.history_weeks);
    let void_column = session.void_column;

    let (current, previous, historical, audits) = tokio::join!(
        fetch::fetch_window(store, void_column, windows.current),
        fetch::fetch_window(store, void_column, windows.previous),
        fetch::fetch_window(store, void_column, windows.historical),
        audit::load_weekly(store, week_start),
    );

    session.absorb(&current);
    session.absorb(&previous);
    session.absorb(&historical);

    let (current, incident_error) = split(current, "current");
    let (previous, previous_error) = split(previous, "previous");
    let (historical, history_error) = split(historical, "historical");

    let kpi = kpi::aggregate(&current);
    let previous_kpi = kpi::aggregate(&previous);
    let kpi_delta = kpi::delta(&kpi, &previous_kpi);

    let guard_scores = get_guard_scores(&current);
    let history = history_scores(&windows, &historical);
    let alerts = trend::build_alerts(&guard_scores, &history, windows.history_weeks);

    info!(
        %week_start,
        incidents = kpi.total,
        callouts = kpi.callouts(),
        guards = guard_scores.len(),
        alerts = alerts.len(),
        audit_source = ?audits.source,
        "weekly report assembled"
    );

    WeeklyReport {
        windows,
        kpi,
        previous_kpi,
        kpi_delta,
        guard_scores,
        alerts,
        audits: audits.weekly,
        audit_source: audits.source,
        audit_error: audits.error,
        incident_error,
        previous_error,
        history_error,
    }
}

fn signed(value: i64) -> String {
    if value > 0 {
        format!("+{value}")
    } else {
        value.to_string()
    }
}

fn write_bucket(output: &mut String, label: &str, bucket: Option<&AuditWeeklyBucket>) {
    match bucket {
        Some(bucket) => {
            let avg = bucket
                .avg_score_pct
                .map(|avg| format!("{avg}%"))
                .unwrap_or_else(|| "n/a".to_string());
            let _ = writeln!(
                output,
                "- {}: {} audits, {} pass / {} conditional / {} fail, pass rate {}%, avg score {}",
                label,
                bucket.total,
                bucket.passes,
                bucket.conditionals,
                bucket.fails,
                bucket.pass_rate,
                avg
            );
        }
        None => {
            let _ = writeln!(output, "- {label}: no data");
        }
    }
}

pub fn render_markdown(report: &WeeklyReport) -> String {
    let mut output = String::new();
    let kpi = &report.kpi;
    let delta = &report.kpi_delta;

    let _ = writeln!(output, "# Weekly Guard Risk Report");
    let _ = writeln!(
        output,
        "Week of {} (baseline over previous {} weeks)",
        report.windows.week_start, report.windows.history_weeks
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Violations");

    if let Some(err) = &report.incident_error {
        let _ = writeln!(output, "Violations unavailable: {err}");
    } else if kpi.total == 0 {
        let _ = writeln!(output, "No violations recorded for this week.");
    } else {
        let _ = writeln!(
            output,
            "- Total: {} ({} vs last week)",
            kpi.total,
            signed(delta.total)
        );
        let _ = writeln!(output, "- Open: {} / Closed: {}", kpi.open, kpi.closed);
        for (slug, count) in kpi.category_counts.iter() {
            let change = delta.category_counts.get(slug).copied().unwrap_or(0);
            let _ = writeln!(output, "- {}: {} ({})", slug, count, signed(change));
        }
        let _ = writeln!(
            output,
            "- Docs: {} provided, {} not provided, {} pending",
            kpi.docs_provided, kpi.docs_not_provided, kpi.docs_pending
        );
        let _ = writeln!(
            output,
            "- Breach days: {} total, {:.1} avg",
            kpi.breach_total, kpi.breach_average
        );
    }
    if let Some(err) = &report.previous_error {
        let _ = writeln!(output, "Previous week unavailable, deltas incomplete: {err}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Guard Alerts");

    if let Some(err) = &report.history_error {
        let _ = writeln!(output, "History unavailable, baselines incomplete: {err}");
    }
    if report.alerts.is_empty() {
        let _ = writeln!(output, "No guards flagged this week.");
    } else {
        for alert in report.alerts.iter() {
            let _ = writeln!(
                output,
                "- [{}] {}: score {} (baseline {:.1}) - {}",
                alert.level.as_str(),
                alert.guard_name,
                alert.score,
                alert.baseline,
                alert.reasons.join(", ")
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Audits");

    if let Some(err) = &report.audit_error {
        let _ = writeln!(output, "Audits unavailable: {err}");
    } else {
        write_bucket(&mut output, "All shifts", report.audits.all.as_ref());
        write_bucket(&mut output, "Day", report.audits.day.as_ref());
        write_bucket(&mut output, "Night", report.audits.night.as_ref());
    }

    output
}
