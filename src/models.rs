use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

pub const CATEGORY_CALLOUT: &str = "callout";
pub const CATEGORY_EARLY_DEPARTURE: &str = "early_departure";
pub const CATEGORY_NCNS: &str = "ncns";

/// Status fields as they were read from the store. Which variant a record
/// carries depends on whether the void column was part of the projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawStatus {
    /// Reduced projection: only the string status is known.
    Legacy(Option<String>),
    /// Full projection: the void flag plus whatever string status exists.
    Flagged { voided: bool, status: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStatus {
    Open,
    Closed,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocStatus {
    Provided,
    NotProvided,
    Pending,
}

impl DocStatus {
    /// Unknown strings are treated the same as a missing value.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "provided" => Some(DocStatus::Provided),
            "not_provided" => Some(DocStatus::NotProvided),
            "pending" => Some(DocStatus::Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IncidentRecord {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub guard_id: Option<Uuid>,
    pub guard_name: String,
    pub category_slug: String,
    pub status: RawStatus,
    pub doc_status: Option<DocStatus>,
    pub breach_days: Option<u32>,
}

impl IncidentRecord {
    /// Key used to group records by guard. Falls back to the name when the
    /// record predates guard ids.
    pub fn guard_key(&self) -> String {
        match self.guard_id {
            Some(id) => id.to_string(),
            None => self.guard_name.trim().to_string(),
        }
    }

    pub fn is_category(&self, slug: &str) -> bool {
        self.category_slug.trim().eq_ignore_ascii_case(slug)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardWeeklySummary {
    pub guard_key: String,
    pub guard_name: String,
    pub incident_count: u32,
    pub callout_count: u32,
    pub early_departure_count: u32,
    pub open_count: u32,
    pub docs_missing_or_pending: u32,
    pub breach_days: u32,
    pub score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    None,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::None => "none",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardAlert {
    pub guard_key: String,
    pub guard_name: String,
    pub level: RiskLevel,
    pub reasons: Vec<String>,
    pub score: u32,
    pub baseline: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiSummary {
    pub total: u32,
    pub open: u32,
    pub closed: u32,
    pub category_counts: BTreeMap<String, u32>,
    pub docs_provided: u32,
    pub docs_not_provided: u32,
    pub docs_pending: u32,
    pub breach_total: u32,
    pub breach_average: f64,
}

impl KpiSummary {
    pub fn category(&self, slug: &str) -> u32 {
        self.category_counts.get(slug).copied().unwrap_or(0)
    }

    pub fn callouts(&self) -> u32 {
        self.category(CATEGORY_CALLOUT)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiDelta {
    pub total: i64,
    pub open: i64,
    pub closed: i64,
    pub category_counts: BTreeMap<String, i64>,
    pub docs_provided: i64,
    pub docs_not_provided: i64,
    pub docs_pending: i64,
    pub breach_total: i64,
    pub breach_average: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftBucket {
    All,
    Day,
    Night,
}

impl ShiftBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftBucket::All => "all",
            ShiftBucket::Day => "day",
            ShiftBucket::Night => "night",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditWeeklyBucket {
    pub total: u32,
    pub passes: u32,
    pub conditionals: u32,
    pub fails: u32,
    pub pass_rate: u32,
    pub avg_score_pct: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditWeekly {
    pub all: Option<AuditWeeklyBucket>,
    pub day: Option<AuditWeeklyBucket>,
    pub night: Option<AuditWeeklyBucket>,
}

/// One row of the precomputed weekly audit aggregate.
#[derive(Debug, Clone)]
pub struct AuditViewRow {
    pub week_start: NaiveDate,
    pub shift_bucket: String,
    pub total: i64,
    pub passes: i64,
    pub conditionals: i64,
    pub fails: i64,
    pub pass_rate: Option<f64>,
    pub avg_score_pct: Option<f64>,
}

/// One raw audit row for the week.
#[derive(Debug, Clone)]
pub struct AuditRow {
    pub id: Uuid,
    pub audited_on: NaiveDate,
    pub shift: Option<String>,
    pub score: Option<f64>,
    pub status: Option<String>,
}
