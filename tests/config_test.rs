use clap::Parser;
use std::path::PathBuf;
use std::sync::Mutex;

use quality_metrics::config::*;

// Env vars are process-global; serialize the tests that touch them.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn with_env_var<T>(key: &str, value: Option<&str>, f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let previous = std::env::var(key).ok();
    match value {
        Some(v) => std::env::set_var(key, v),
        None => std::env::remove_var(key),
    }
    let _restore = scopeguard::guard(previous, |previous| match previous {
        Some(v) => std::env::set_var(key, v),
        None => std::env::remove_var(key),
    });
    f()
}

#[test]
fn test_default_constants() {
    assert_eq!(DEFAULT_PORT, 9880);
    assert_eq!(DEFAULT_QUERY_LIMIT, 50);
    assert_eq!(HISTORY_LIMIT, 30);
    assert_eq!(STATISTICS_WINDOW, 10);
    assert_eq!(DEFAULT_DB_FILENAME, "quality-metrics.db");
}

#[test]
fn test_serve_defaults() {
    let args = with_env_var(DB_PATH_ENV, None, || {
        with_env_var_unlocked(MISSING_LOAD_TIME_ENV, || {
            CliArgs::try_parse_from(["quality-metrics", "serve"]).unwrap()
        })
    });
    assert!(matches!(args.command, Command::Serve { port: DEFAULT_PORT }));
    assert!(args.db_path.is_none());
    assert_eq!(args.missing_load_time, MissingValuePolicy::Skip);
}

#[test]
fn test_db_flag_after_subcommand() {
    let args = CliArgs::try_parse_from([
        "quality-metrics",
        "statistics",
        "--branch",
        "main",
        "--db",
        "/tmp/qm/metrics.db",
        "--missing-load-time",
        "zero",
    ])
    .unwrap();

    match &args.command {
        Command::Statistics { branch } => assert_eq!(branch.as_deref(), Some("main")),
        other => panic!("unexpected command: {:?}", other),
    }
    let config = MetricsConfig::from_args(&args);
    assert_eq!(config.db_path, PathBuf::from("/tmp/qm/metrics.db"));
    assert_eq!(config.missing_load_time, MissingValuePolicy::Zero);
}

#[test]
fn test_db_path_from_env() {
    let args = with_env_var(DB_PATH_ENV, Some("/var/lib/qm/ci.db"), || {
        CliArgs::try_parse_from(["quality-metrics", "overview"]).unwrap()
    });
    let config = MetricsConfig::from_args(&args);
    assert_eq!(config.db_path, PathBuf::from("/var/lib/qm/ci.db"));
}

#[test]
fn test_default_db_path_when_unset() {
    let args = with_env_var(DB_PATH_ENV, None, || {
        CliArgs::try_parse_from(["quality-metrics", "overview", "-b", "dev"]).unwrap()
    });
    let config = MetricsConfig::from_args(&args);
    assert_eq!(config.db_path, default_db_path());
    assert!(config.db_path.ends_with("quality-metrics.db"));
}

#[test]
fn test_ingest_requires_file() {
    assert!(CliArgs::try_parse_from(["quality-metrics", "ingest"]).is_err());
    let args = CliArgs::try_parse_from(["quality-metrics", "ingest", "run.json"]).unwrap();
    assert!(matches!(args.command, Command::Ingest { ref file } if file == &PathBuf::from("run.json")));
}

#[test]
fn test_unknown_policy_rejected() {
    assert!(CliArgs::try_parse_from([
        "quality-metrics",
        "serve",
        "--missing-load-time",
        "average"
    ])
    .is_err());
}

/// Clears `key` for the duration of `f`; caller must already hold `ENV_LOCK`.
fn with_env_var_unlocked<T>(key: &str, f: impl FnOnce() -> T) -> T {
    let previous = std::env::var(key).ok();
    std::env::remove_var(key);
    let _restore = scopeguard::guard(previous, |previous| {
        if let Some(v) = previous {
            std::env::set_var(key, v);
        }
    });
    f()
}
