use serde::Serialize;
use tracing::{debug, warn};

use crate::models::IncidentRecord;
use crate::status;
use crate::store::{IncidentStore, Projection, StoreError};
use crate::window::Window;

/// What is known about the optional `is_void` column for this session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoidColumn {
    #[default]
    Unknown,
    Available,
    Missing,
}

impl VoidColumn {
    fn projection(self) -> Projection {
        match self {
            VoidColumn::Missing => Projection::Reduced,
            VoidColumn::Unknown | VoidColumn::Available => Projection::Full,
        }
    }

    /// Combine discoveries made by fetches that ran side by side.
    pub fn merge(self, other: VoidColumn) -> VoidColumn {
        match (self, other) {
            (VoidColumn::Missing, _) | (_, VoidColumn::Missing) => VoidColumn::Missing,
            (VoidColumn::Available, _) | (_, VoidColumn::Available) => VoidColumn::Available,
            _ => VoidColumn::Unknown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedWindow {
    pub records: Vec<IncidentRecord>,
    pub void_column: VoidColumn,
}

/// Load the non-void incidents inside `window`, oldest first.
///
/// A schema-drift error on the full projection is retried once without the
/// void column and the returned capability says so; callers pass it back in
/// on the next call to skip the failing attempt. Any other error is returned
/// untouched.
pub async fn fetch_window<S>(
    store: &S,
    void_column: VoidColumn,
    window: Window,
) -> Result<FetchedWindow, StoreError>
where
    S: IncidentStore + ?Sized,
{
    let projection = void_column.projection();
    let (rows, void_column) = match store
        .query_incidents(projection, window.from, window.to)
        .await
    {
        Ok(rows) => {
            let discovered = match projection {
                Projection::Full => VoidColumn::Available,
                Projection::Reduced => VoidColumn::Missing,
            };
            (rows, discovered)
        }
        Err(StoreError::SchemaDrift { column }) if projection == Projection::Full => {
            warn!(%column, "void column unavailable, retrying with reduced projection");
            let rows = store
                .query_incidents(Projection::Reduced, window.from, window.to)
                .await?;
            (rows, VoidColumn::Missing)
        }
        Err(err) => return Err(err),
    };

    let fetched = rows.len();
    let mut records: Vec<IncidentRecord> = rows
        .into_iter()
        .filter(|record| !status::is_void(record))
        .collect();
    records.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at).then_with(|| a.id.cmp(&b.id)));

    debug!(
        from = %window.from,
        to = %window.to,
        fetched,
        kept = records.len(),
        "incident window loaded"
    );

    Ok(FetchedWindow {
        records,
        void_column,
    })
}
