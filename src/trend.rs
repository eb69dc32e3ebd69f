//! Risk classification of a guard's current week against their own recent
//! history.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{GuardAlert, GuardWeeklySummary, RiskLevel};

pub const HIGH_CALLOUTS: u32 = 2;
pub const HIGH_DOCS: u32 = 2;
pub const HIGH_SCORE: u32 = 18;
pub const HIGH_RATIO: f64 = 1.6;
pub const MODERATE_SCORE: u32 = 10;
pub const MODERATE_RATIO: f64 = 1.25;
/// Ratio checks only apply once the baseline reaches this much activity.
pub const MIN_BASELINE: f64 = 4.0;

/// Average score over `history_weeks` windows. Weeks without incidents are
/// absent from `scores` but still count in the denominator.
pub fn baseline(scores: &[u32], history_weeks: u32) -> f64 {
    if history_weeks == 0 {
        return 0.0;
    }
    let total: u64 = scores.iter().map(|score| u64::from(*score)).sum();
    total as f64 / f64::from(history_weeks)
}

/// `None` stands for an unbounded ratio (no baseline to compare against).
fn ratio(score: u32, baseline: f64) -> Option<f64> {
    (baseline > 0.0).then(|| f64::from(score) / baseline)
}

fn ratio_reason(ratio: f64, history_weeks: u32) -> String {
    let pct = ((ratio - 1.0) * 100.0).round() as i64;
    format!("↑{pct}% vs {history_weeks}-wk avg")
}

pub fn classify(
    current: &GuardWeeklySummary,
    historical_scores: &[u32],
    history_weeks: u32,
) -> GuardAlert {
    let baseline = baseline(historical_scores, history_weeks);
    let ratio = ratio(current.score, baseline).filter(|_| baseline >= MIN_BASELINE);

    let mut reasons = Vec::new();
    let mut level = RiskLevel::None;

    if current.callout_count >= HIGH_CALLOUTS {
        level = RiskLevel::High;
        reasons.push(format!("{} callouts", current.callout_count));
    }
    if current.docs_missing_or_pending >= HIGH_DOCS {
        level = RiskLevel::High;
        reasons.push(format!("{} docs missing/pending", current.docs_missing_or_pending));
    }
    if current.score >= HIGH_SCORE {
        level = RiskLevel::High;
        reasons.push(format!("score {}", current.score));
    }
    if let Some(ratio) = ratio.filter(|ratio| *ratio >= HIGH_RATIO) {
        level = RiskLevel::High;
        reasons.push(ratio_reason(ratio, history_weeks));
    }

    if level != RiskLevel::High {
        if current.score >= MODERATE_SCORE {
            level = RiskLevel::Moderate;
            reasons.push(format!("score {}", current.score));
        }
        if let Some(ratio) = ratio.filter(|ratio| *ratio >= MODERATE_RATIO) {
            level = RiskLevel::Moderate;
            reasons.push(ratio_reason(ratio, history_weeks));
        }
    }

    GuardAlert {
        guard_key: current.guard_key.clone(),
        guard_name: current.guard_name.clone(),
        level,
        reasons,
        score: current.score,
        baseline,
    }
}

/// Classify every guard active in the current window against their scores in
/// each historical week and return the ones that warrant an alert, most
/// severe first.
pub fn build_alerts(
    current: &[GuardWeeklySummary],
    history: &[Vec<GuardWeeklySummary>],
    history_weeks: u32,
) -> Vec<GuardAlert> {
    let mut past: HashMap<&str, Vec<u32>> = HashMap::new();
    for week in history {
        for summary in week {
            past.entry(summary.guard_key.as_str())
                .or_default()
                .push(summary.score);
        }
    }

    let mut alerts: Vec<GuardAlert> = current
        .iter()
        .map(|summary| {
            let scores = past
                .get(summary.guard_key.as_str())
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            classify(summary, scores, history_weeks)
        })
        .filter(|alert| alert.level != RiskLevel::None)
        .collect();

    alerts.sort_by(alert_order);
    alerts
}

pub fn alert_order(a: &GuardAlert, b: &GuardAlert) -> Ordering {
    b.level
        .cmp(&a.level)
        .then_with(|| b.score.cmp(&a.score))
        .then_with(|| a.guard_name.cmp(&b.guard_name))
        .then_with(|| a.guard_key.cmp(&b.guard_key))
}
