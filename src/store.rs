use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::models::{AuditRow, AuditViewRow, IncidentRecord};

/// Columns requested when reading incidents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Includes the optional `is_void` column.
    Full,
    /// Leaves the void column out; string status is authoritative.
    Reduced,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("column does not exist: {column}")]
    SchemaDrift { column: String },
    #[error("relation does not exist: {relation}")]
    NotFound { relation: String },
    #[error("fetch failed: {0}")]
    Transient(String),
}

/// Persistent store holding incidents and audits. Authorization and transport
/// retries are the implementor's concern.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Incidents with `from <= occurred_at < to`, ordered by `occurred_at`.
    async fn query_incidents(
        &self,
        projection: Projection,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<IncidentRecord>, StoreError>;

    async fn query_weekly_audit_view(
        &self,
        week_start: NaiveDate,
    ) -> Result<Vec<AuditViewRow>, StoreError>;

    async fn query_raw_audits(&self, week_start: NaiveDate) -> Result<Vec<AuditRow>, StoreError>;
}

#[cfg(test)]
pub mod memory {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::models::RawStatus;

    pub fn incident(
        guard: &str,
        category: &str,
        status: &str,
        occurred_at: DateTime<Utc>,
    ) -> IncidentRecord {
        IncidentRecord {
            id: Uuid::new_v4(),
            occurred_at,
            guard_id: None,
            guard_name: guard.to_string(),
            category_slug: category.to_string(),
            status: RawStatus::Flagged {
                voided: false,
                status: Some(status.to_string()),
            },
            doc_status: None,
            breach_days: None,
        }
    }

    /// In-memory store with switchable failure modes.
    #[derive(Default)]
    pub struct MemoryStore {
        pub incidents: Vec<IncidentRecord>,
        pub audit_view: Vec<AuditViewRow>,
        pub raw_audits: Vec<AuditRow>,
        pub void_column_missing: bool,
        pub audit_view_missing: bool,
        pub incidents_error: Option<String>,
        /// Fails only the incident query whose window starts at the given instant.
        pub window_errors: Vec<(DateTime<Utc>, String)>,
        pub audit_view_error: Option<String>,
        pub raw_audits_error: Option<String>,
        pub full_calls: AtomicUsize,
        pub reduced_calls: AtomicUsize,
        pub raw_audit_calls: AtomicUsize,
    }

    impl MemoryStore {
        pub fn with_incidents(incidents: Vec<IncidentRecord>) -> Self {
            Self {
                incidents,
                ..Self::default()
            }
        }

        pub fn full_calls(&self) -> usize {
            self.full_calls.load(Ordering::SeqCst)
        }

        pub fn reduced_calls(&self) -> usize {
            self.reduced_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IncidentStore for MemoryStore {
        async fn query_incidents(
            &self,
            projection: Projection,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<IncidentRecord>, StoreError> {
            match projection {
                Projection::Full => self.full_calls.fetch_add(1, Ordering::SeqCst),
                Projection::Reduced => self.reduced_calls.fetch_add(1, Ordering::SeqCst),
            };

            if let Some(message) = &self.incidents_error {
                return Err(StoreError::Transient(message.clone()));
            }
            if let Some((_, message)) = self.window_errors.iter().find(|(start, _)| *start == from) {
                return Err(StoreError::Transient(message.clone()));
            }
            if projection == Projection::Full && self.void_column_missing {
                return Err(StoreError::SchemaDrift {
                    column: "is_void".to_string(),
                });
            }

            let mut rows: Vec<IncidentRecord> = self
                .incidents
                .iter()
                .filter(|record| record.occurred_at >= from && record.occurred_at < to)
                .cloned()
                .map(|mut record| {
                    if projection == Projection::Reduced {
                        let status = match record.status {
                            RawStatus::Legacy(status) => status,
                            RawStatus::Flagged { status, .. } => status,
                        };
                        record.status = RawStatus::Legacy(status);
                    }
                    record
                })
                .collect();
            rows.sort_by_key(|record| record.occurred_at);
            Ok(rows)
        }

        async fn query_weekly_audit_view(
            &self,
            week_start: NaiveDate,
        ) -> Result<Vec<AuditViewRow>, StoreError> {
            if self.audit_view_missing {
                return Err(StoreError::NotFound {
                    relation: "audit_weekly_summary".to_string(),
                });
            }
            if let Some(message) = &self.audit_view_error {
                return Err(StoreError::Transient(message.clone()));
            }
            Ok(self
                .audit_view
                .iter()
                .filter(|row| row.week_start == week_start)
                .cloned()
                .collect())
        }

        async fn query_raw_audits(
            &self,
            week_start: NaiveDate,
        ) -> Result<Vec<AuditRow>, StoreError> {
            self.raw_audit_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = &self.raw_audits_error {
                return Err(StoreError::Transient(message.clone()));
            }
            let week_end = week_start + Duration::days(7);
            Ok(self
                .raw_audits
                .iter()
                .filter(|row| row.audited_on >= week_start && row.audited_on < week_end)
                .cloned()
                .collect())
        }
    }
}
