use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    AuditRow, AuditViewRow, DocStatus, IncidentRecord, RawStatus, CATEGORY_CALLOUT,
    CATEGORY_EARLY_DEPARTURE, CATEGORY_NCNS,
};
use crate::store::{IncidentStore, Projection, StoreError};

const UNDEFINED_COLUMN: &str = "42703";
const UNDEFINED_TABLE: &str = "42P01";

const FULL_PROJECTION: &str = "SELECT id, occurred_at, guard_id, guard_name, category_slug, \
     status, is_void, doc_status, breach_days \
     FROM guard_ops.violations \
     WHERE occurred_at >= $1 AND occurred_at < $2 \
     ORDER BY occurred_at";

const REDUCED_PROJECTION: &str = "SELECT id, occurred_at, guard_id, guard_name, category_slug, \
     status, doc_status, breach_days \
     FROM guard_ops.violations \
     WHERE occurred_at >= $1 AND occurred_at < $2 \
     ORDER BY occurred_at";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed incident and audit store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some(UNDEFINED_COLUMN) => {
                return StoreError::SchemaDrift {
                    column: db_err.message().to_string(),
                }
            }
            Some(UNDEFINED_TABLE) => {
                return StoreError::NotFound {
                    relation: db_err.message().to_string(),
                }
            }
            _ => {}
        }
    }
    StoreError::Transient(err.to_string())
}

fn incident_from_row(row: &PgRow, projection: Projection) -> Result<IncidentRecord, sqlx::Error> {
    let status: Option<String> = row.try_get("status")?;
    let status = match projection {
        Projection::Full => RawStatus::Flagged {
            voided: row.try_get::<Option<bool>, _>("is_void")?.unwrap_or(false),
            status,
        },
        Projection::Reduced => RawStatus::Legacy(status),
    };
    let doc_status: Option<String> = row.try_get("doc_status")?;
    let breach_days: Option<i32> = row.try_get("breach_days")?;

    Ok(IncidentRecord {
        id: row.try_get("id")?,
        occurred_at: row.try_get("occurred_at")?,
        guard_id: row.try_get("guard_id")?,
        guard_name: row
            .try_get::<Option<String>, _>("guard_name")?
            .unwrap_or_default(),
        category_slug: row
            .try_get::<Option<String>, _>("category_slug")?
            .unwrap_or_default(),
        status,
        doc_status: doc_status.as_deref().and_then(DocStatus::parse),
        breach_days: breach_days.and_then(|days| u32::try_from(days).ok()),
    })
}

#[async_trait]
impl IncidentStore for PgStore {
    async fn query_incidents(
        &self,
        projection: Projection,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<IncidentRecord>, StoreError> {
        let query = match projection {
            Projection::Full => FULL_PROJECTION,
            Projection::Reduced => REDUCED_PROJECTION,
        };

        let rows = sqlx::query(query)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rows.iter()
            .map(|row| incident_from_row(row, projection))
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)
    }

    async fn query_weekly_audit_view(
        &self,
        week_start: NaiveDate,
    ) -> Result<Vec<AuditViewRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT week_start, shift_bucket, total, passes, conditionals, fails,
                   pass_rate, avg_score_pct
            FROM guard_ops.audit_weekly_summary
            WHERE week_start = $1
            "#,
        )
        .bind(week_start)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(AuditViewRow {
                week_start: row.try_get("week_start").map_err(store_error)?,
                shift_bucket: row.try_get("shift_bucket").map_err(store_error)?,
                total: row.try_get("total").map_err(store_error)?,
                passes: row.try_get("passes").map_err(store_error)?,
                conditionals: row.try_get("conditionals").map_err(store_error)?,
                fails: row.try_get("fails").map_err(store_error)?,
                pass_rate: row.try_get("pass_rate").map_err(store_error)?,
                avg_score_pct: row.try_get("avg_score_pct").map_err(store_error)?,
            });
        }

        Ok(summaries)
    }

    async fn query_raw_audits(&self, week_start: NaiveDate) -> Result<Vec<AuditRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, audited_on, shift, score, status
            FROM guard_ops.audits
            WHERE audited_on >= $1 AND audited_on < $2
            ORDER BY audited_on
            "#,
        )
        .bind(week_start)
        .bind(week_start + Duration::days(7))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        let mut audits = Vec::new();
        for row in rows {
            audits.push(AuditRow {
                id: row.try_get("id").map_err(store_error)?,
                audited_on: row.try_get("audited_on").map_err(store_error)?,
                shift: row.try_get("shift").map_err(store_error)?,
                score: row.try_get("score").map_err(store_error)?,
                status: row.try_get("status").map_err(store_error)?,
            });
        }

        Ok(audits)
    }
}

async fn upsert_guard(pool: &PgPool, full_name: &str) -> anyhow::Result<Uuid> {
    let guard_id: Uuid = sqlx::query(
        r#"
        INSERT INTO guard_ops.guards (id, full_name)
        VALUES ($1, $2)
        ON CONFLICT (full_name) DO UPDATE
        SET full_name = EXCLUDED.full_name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .fetch_one(pool)
    .await?
    .try_get("id")?;
    Ok(guard_id)
}

struct NewViolation<'a> {
    source_key: &'a str,
    guard_name: &'a str,
    category_slug: &'a str,
    status: Option<&'a str>,
    doc_status: Option<&'a str>,
    breach_days: Option<i32>,
    occurred_at: DateTime<Utc>,
}

async fn insert_violation(pool: &PgPool, violation: &NewViolation<'_>) -> anyhow::Result<bool> {
    let guard_id = upsert_guard(pool, violation.guard_name).await?;
    let result = sqlx::query(
        r#"
        INSERT INTO guard_ops.violations
        (id, guard_id, guard_name, category_slug, status, doc_status, breach_days,
         occurred_at, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(guard_id)
    .bind(violation.guard_name)
    .bind(violation.category_slug)
    .bind(violation.status)
    .bind(violation.doc_status)
    .bind(violation.breach_days)
    .bind(violation.occurred_at)
    .bind(violation.source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let week_start = crate::window::current_week_start();
    let day = |offset: i64| -> anyhow::Result<DateTime<Utc>> {
        let date = week_start + Duration::days(offset);
        Ok(date
            .and_hms_opt(8, 0, 0)
            .context("invalid seed time")?
            .and_utc())
    };

    let violations = vec![
        NewViolation {
            source_key: "seed-001",
            guard_name: "Jane Alvarez",
            category_slug: CATEGORY_CALLOUT,
            status: Some("open"),
            doc_status: Some("not_provided"),
            breach_days: Some(1),
            occurred_at: day(0)?,
        },
        NewViolation {
            source_key: "seed-002",
            guard_name: "Jane Alvarez",
            category_slug: CATEGORY_CALLOUT,
            status: Some("open"),
            doc_status: Some("pending"),
            breach_days: None,
            occurred_at: day(2)?,
        },
        NewViolation {
            source_key: "seed-003",
            guard_name: "Marcus Reed",
            category_slug: CATEGORY_EARLY_DEPARTURE,
            status: Some("closed"),
            doc_status: Some("provided"),
            breach_days: None,
            occurred_at: day(1)?,
        },
        NewViolation {
            source_key: "seed-004",
            guard_name: "Marcus Reed",
            category_slug: CATEGORY_NCNS,
            status: Some("open"),
            doc_status: None,
            breach_days: Some(2),
            occurred_at: day(-9)?,
        },
        NewViolation {
            source_key: "seed-005",
            guard_name: "Priya Shah",
            category_slug: CATEGORY_NCNS,
            status: Some("void"),
            doc_status: None,
            breach_days: None,
            occurred_at: day(3)?,
        },
        NewViolation {
            source_key: "seed-006",
            guard_name: "Priya Shah",
            category_slug: CATEGORY_CALLOUT,
            status: Some("closed"),
            doc_status: Some("provided"),
            breach_days: None,
            occurred_at: day(-16)?,
        },
    ];

    for violation in violations.iter() {
        insert_violation(pool, violation).await?;
    }

    let audits = vec![
        ("seed-audit-001", 0, "day", 96.0),
        ("seed-audit-002", 1, "night", 84.0),
        ("seed-audit-003", 2, "night", 71.5),
        ("seed-audit-004", 3, "day", 90.0),
    ];

    for (source_key, offset, shift, score) in audits {
        sqlx::query(
            r#"
            INSERT INTO guard_ops.audits (id, audited_on, shift, score, source_key)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(week_start + Duration::days(offset))
        .bind(shift)
        .bind(score)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        guard_name: String,
        category: String,
        status: Option<String>,
        doc_status: Option<String>,
        breach_days: Option<i32>,
        occurred_at: DateTime<Utc>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let source_key = row
            .source_key
            .clone()
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let violation = NewViolation {
            source_key: &source_key,
            guard_name: row.guard_name.trim(),
            category_slug: row.category.trim(),
            status: row.status.as_deref(),
            doc_status: row.doc_status.as_deref(),
            breach_days: row.breach_days,
            occurred_at: row.occurred_at,
        };

        if insert_violation(pool, &violation).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}
