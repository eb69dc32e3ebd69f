use anyhow::Context;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod audit;
mod config;
mod db;
mod fetch;
mod kpi;
mod models;
mod report;
mod scoring;
mod status;
mod store;
mod trend;
mod window;

use config::{Cli, Commands};
use fetch::VoidColumn;
use report::ReportSession;

fn resolve_week(week: Option<chrono::NaiveDate>) -> chrono::NaiveDate {
    week.map(window::week_start_for)
        .unwrap_or_else(window::current_week_start)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = PgPoolOptions::new()
        .max_connections(cli.max_connections)
        .connect(&cli.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = db::PgStore::new(pool.clone());

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} violations from {}.", csv.display());
        }
        Commands::Score { week, limit } => {
            let week_start = resolve_week(week);
            let window = window::Window::week_of(week_start);
            let fetched = fetch::fetch_window(&store, VoidColumn::Unknown, window)
                .await
                .context("failed to load violations")?;
            let scores = report::get_guard_scores(&fetched.records);

            if scores.is_empty() {
                println!("No violations found for the week of {week_start}.");
                return Ok(());
            }

            println!("Guards by risk score, week of {week_start}:");
            for score in scores.iter().take(limit) {
                println!(
                    "- {} score {} ({} incidents: {} callouts, {} early departures, {} open, {} docs missing/pending, {} breach days)",
                    score.guard_name,
                    score.score,
                    score.incident_count,
                    score.callout_count,
                    score.early_departure_count,
                    score.open_count,
                    score.docs_missing_or_pending,
                    score.breach_days
                );
            }
        }
        Commands::Report { week, out, json } => {
            let week_start = resolve_week(week);
            let mut session = ReportSession::new(cli.history_weeks);
            let report = report::get_weekly_report(&store, &mut session, week_start).await;
            info!(void_column = ?session.void_column, "report session finished");

            let rendered = if json {
                serde_json::to_string_pretty(&report)?
            } else {
                report::render_markdown(&report)
            };
            std::fs::write(&out, rendered)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Audits { week } => {
            let week_start = resolve_week(week);
            let load = audit::load_weekly(&store, week_start).await;

            println!("Audits for the week of {week_start} (source: {:?}):", load.source);
            if let Some(err) = &load.error {
                println!("Audits unavailable: {err}");
                return Ok(());
            }
            for (label, bucket) in [
                (models::ShiftBucket::All, &load.weekly.all),
                (models::ShiftBucket::Day, &load.weekly.day),
                (models::ShiftBucket::Night, &load.weekly.night),
            ] {
                match bucket {
                    Some(bucket) => println!(
                        "- {}: {} audits, pass rate {}%, avg score {}",
                        label.as_str(),
                        bucket.total,
                        bucket.pass_rate,
                        bucket
                            .avg_score_pct
                            .map(|avg| format!("{avg}%"))
                            .unwrap_or_else(|| "n/a".to_string())
                    ),
                    None => println!("- {}: no data", label.as_str()),
                }
            }
        }
    }

    Ok(())
}
