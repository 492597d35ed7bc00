use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Quality Metrics: stores CI quality snapshots and serves trend views.
#[derive(Parser, Debug, Clone)]
#[command(name = "quality-metrics", version)]
pub struct CliArgs {
    /// Path to the SQLite metrics database
    #[arg(long = "db", env = DB_PATH_ENV, global = true)]
    pub db_path: Option<PathBuf>,

    /// How missing load times enter the statistics average
    #[arg(
        long = "missing-load-time",
        env = MISSING_LOAD_TIME_ENV,
        value_enum,
        default_value_t = MissingValuePolicy::Skip,
        global = true
    )]
    pub missing_load_time: MissingValuePolicy,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the metrics HTTP API
    Serve {
        #[arg(long = "port", default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Save a CI run payload (JSON) and print the stored record
    Ingest {
        /// Path to the JSON payload
        file: PathBuf,
    },
    /// Print the dashboard overview as JSON
    Overview {
        #[arg(short = 'b', long = "branch")]
        branch: Option<String>,
    },
    /// Print rolling statistics as JSON
    Statistics {
        #[arg(short = 'b', long = "branch")]
        branch: Option<String>,
    },
}

/// Treatment of records that lack a value when averaging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum MissingValuePolicy {
    /// Average only the records that carry a value.
    #[default]
    Skip,
    /// Count a missing value as zero.
    Zero,
}

pub struct MetricsConfig {
    pub db_path: PathBuf,
    pub missing_load_time: MissingValuePolicy,
}

// Environment
pub const DB_PATH_ENV: &str = "QUALITY_METRICS_DB";
pub const MISSING_LOAD_TIME_ENV: &str = "QUALITY_METRICS_MISSING_LOAD_TIME";

// Server
pub const DEFAULT_PORT: u16 = 9880;

// Storage
pub const DEFAULT_DB_FILENAME: &str = "quality-metrics.db";
pub const DATA_DIR_NAME: &str = "quality-metrics";

// Query windows
pub const DEFAULT_QUERY_LIMIT: usize = 50;
pub const HISTORY_LIMIT: usize = 30;
pub const STATISTICS_WINDOW: usize = 10;

impl MetricsConfig {
    pub fn from_args(args: &CliArgs) -> Self {
        MetricsConfig {
            db_path: args.db_path.clone().unwrap_or_else(default_db_path),
            missing_load_time: args.missing_load_time,
        }
    }
}

/// `<data dir>/quality-metrics/quality-metrics.db`, falling back to the
/// working directory when the platform has no data dir.
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(DATA_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DB_FILENAME)
}
