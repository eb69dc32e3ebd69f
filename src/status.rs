use crate::models::{CanonicalStatus, IncidentRecord, RawStatus};

/// Resolve the persisted status fields of an incident into one canonical
/// status. Every consumer goes through here so that two windows reading the
/// same row always agree.
pub fn canonical_status(record: &IncidentRecord) -> CanonicalStatus {
    reconcile(&record.status)
}

pub fn reconcile(raw: &RawStatus) -> CanonicalStatus {
    let (voided, status) = match raw {
        RawStatus::Legacy(status) => (false, status.as_deref()),
        RawStatus::Flagged { voided, status } => (*voided, status.as_deref()),
    };

    let normalized = status.map(|value| value.trim().to_ascii_lowercase());

    if voided || normalized.as_deref().is_some_and(|value| value.starts_with("void")) {
        return CanonicalStatus::Void;
    }

    match normalized.as_deref() {
        Some("closed") => CanonicalStatus::Closed,
        _ => CanonicalStatus::Open,
    }
}

pub fn is_void(record: &IncidentRecord) -> bool {
    canonical_status(record) == CanonicalStatus::Void
}
