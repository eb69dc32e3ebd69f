use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::window::{DEFAULT_HISTORY_WEEKS, MAX_HISTORY_WEEKS};

#[derive(Parser, Debug)]
#[command(name = "guard-ops-risk")]
#[command(about = "Weekly violation, risk and audit reporting for guard operations", long_about = None)]
pub struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// Connection pool size
    #[arg(long, env = "MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Number of prior weeks averaged into each guard's baseline
    #[arg(
        long,
        env = "HISTORY_WEEKS",
        default_value_t = DEFAULT_HISTORY_WEEKS,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_HISTORY_WEEKS))
    )]
    pub history_weeks: u32,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data for the current week
    Seed,
    /// Import violations from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Rank guards by composite score for a week
    Score {
        /// Any date inside the week; defaults to the current week
        #[arg(long)]
        week: Option<NaiveDate>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate the weekly risk report
    Report {
        #[arg(long)]
        week: Option<NaiveDate>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        /// Write JSON instead of markdown
        #[arg(long)]
        json: bool,
    },
    /// Show the week's audit buckets
    Audits {
        #[arg(long)]
        week: Option<NaiveDate>,
    },
}

impl Cli {
    pub fn log_filter(&self) -> String {
        format!("guard_ops_risk={},info", self.log_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_report_arguments() {
        let cli = Cli::try_parse_from([
            "guard-ops-risk",
            "--database-url",
            "postgres://localhost/guard_ops",
            "--history-weeks",
            "6",
            "report",
            "--week",
            "2026-03-11",
            "--json",
        ])
        .expect("arguments parse");

        assert_eq!(cli.history_weeks, 6);
        match cli.command {
            Commands::Report { week, out, json } => {
                assert_eq!(week, NaiveDate::from_ymd_opt(2026, 3, 11));
                assert_eq!(out, PathBuf::from("report.md"));
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_history_beyond_a_year() {
        let result = Cli::try_parse_from([
            "guard-ops-risk",
            "--database-url",
            "postgres://localhost/guard_ops",
            "--history-weeks",
            "4000000000",
            "init-db",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn log_filter_scopes_crate_level() {
        let cli = Cli::try_parse_from([
            "guard-ops-risk",
            "--database-url",
            "postgres://localhost/guard_ops",
            "--log-level",
            "debug",
            "init-db",
        ])
        .expect("arguments parse");
        assert_eq!(cli.log_filter(), "guard_ops_risk=debug,info");
    }
}
