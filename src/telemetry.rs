//! Tracing subscriber setup for replicas and the CLI.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::{FileLoggingConfig, LogFormat, LogRotation, LoggingConfig};
use crate::core::ReplicaId;

/// Environment variable holding `EnvFilter` directives.
pub const LOG_ENV: &str = "KV_LOG";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub verbosity: u8,
    pub logging: LoggingConfig,
    /// Names the log file; `None` logs to `cli.log`.
    pub replica: Option<ReplicaId>,
}

impl TelemetryConfig {
    pub fn new(verbosity: u8, logging: LoggingConfig) -> Self {
        Self {
            verbosity,
            logging,
            replica: None,
        }
    }

    pub fn for_replica(mut self, replica: ReplicaId) -> Self {
        self.replica = Some(replica);
        self
    }

    fn file_prefix(&self) -> String {
        match self.replica {
            Some(replica) => format!("replica-{replica}.log"),
            None => "cli.log".to_string(),
        }
    }
}

pub fn is_test_env() -> bool {
    std::env::var_os("KV_TESTING").is_some() || std::env::var_os("RUST_TEST_THREADS").is_some()
}

/// Replicas never write log files from inside a test run.
pub fn apply_replica_logging_defaults(logging: &mut LoggingConfig) {
    apply_replica_logging_defaults_inner(logging, is_test_env());
}

fn apply_replica_logging_defaults_inner(logging: &mut LoggingConfig, is_test_env: bool) {
    if is_test_env {
        logging.file.enabled = false;
    }
}

/// Keeps the non-blocking file writers alive. Drop flushes them.
pub struct TelemetryGuard {
    _guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
}

pub fn init(config: TelemetryConfig) -> TelemetryGuard {
    let mut setup_errors = Vec::new();
    let filter = build_filter(
        config.verbosity,
        config.logging.filter.as_deref(),
        &mut setup_errors,
    );

    let mut guards = Vec::new();
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.logging.stdout {
        layers.push(build_stdout_layer(config.logging.stdout_format));
    }

    let mut prune_report = None;
    if config.logging.file.enabled {
        let dir = resolve_log_dir(&config.logging.file);
        let prefix = config.file_prefix();
        match fs::create_dir_all(&dir) {
            Ok(()) => {
                if let Some(max_files) = config.logging.file.retention_max_files {
                    match prune_logs(&dir, &prefix, max_files) {
                        Ok(report) => prune_report = Some(report),
                        Err(err) => setup_errors.push(format!("log retention failed: {err}")),
                    }
                }
                let (layer, guard) = build_file_layer(&config.logging.file, &dir, &prefix);
                layers.push(layer);
                guards.push(guard);
            }
            Err(err) => {
                setup_errors.push(format!("log dir init failed for {}: {err}", dir.display()));
            }
        }
    }

    layers.push(Box::new(filter));

    if let Err(err) = Registry::default().with(layers).try_init() {
        setup_errors.push(format!("tracing subscriber already installed: {err}"));
    }

    if let Some(report) = prune_report
        && report.removed + report.failed > 0
    {
        tracing::info!(
            pruned = report.removed,
            failed = report.failed,
            candidates = report.candidates,
            "log retention applied"
        );
    }
    for error in setup_errors {
        tracing::warn!("{error}");
    }

    TelemetryGuard { _guards: guards }
}

fn build_filter(verbosity: u8, configured: Option<&str>, errors: &mut Vec<String>) -> EnvFilter {
    if std::env::var_os(LOG_ENV).is_none()
        && let Some(directives) = configured
    {
        match EnvFilter::try_new(directives) {
            Ok(filter) => return filter,
            Err(err) => errors.push(format!("invalid logging.filter `{directives}`: {err}")),
        }
    }
    EnvFilter::builder()
        .with_default_directive(level_from_verbosity(verbosity).into())
        .with_env_var(LOG_ENV)
        .from_env_lossy()
}

fn build_stdout_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Pretty => Box::new(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true),
        ),
        LogFormat::Compact => Box::new(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true),
        ),
        LogFormat::Json => Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true)
                .with_current_span(true),
        ),
    }
}

fn build_file_layer(
    config: &FileLoggingConfig,
    dir: &Path,
    prefix: &str,
) -> (BoxedLayer, tracing_appender::non_blocking::WorkerGuard) {
    let rotation = match config.rotation {
        LogRotation::Daily => tracing_appender::rolling::Rotation::DAILY,
        LogRotation::Hourly => tracing_appender::rolling::Rotation::HOURLY,
        LogRotation::Minutely => tracing_appender::rolling::Rotation::MINUTELY,
        LogRotation::Never => tracing_appender::rolling::Rotation::NEVER,
    };
    let appender = tracing_appender::rolling::RollingFileAppender::new(rotation, dir, prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer: BoxedLayer = match config.format {
        LogFormat::Pretty => Box::new(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_names(true),
        ),
        LogFormat::Compact => Box::new(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_names(true),
        ),
        LogFormat::Json => Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_thread_names(true)
                .with_current_span(true),
        ),
    };
    (layer, guard)
}

fn level_from_verbosity(verbosity: u8) -> tracing::metadata::LevelFilter {
    match verbosity {
        0 => tracing::metadata::LevelFilter::WARN,
        1 => tracing::metadata::LevelFilter::INFO,
        _ => tracing::metadata::LevelFilter::DEBUG,
    }
}

fn resolve_log_dir(config: &FileLoggingConfig) -> PathBuf {
    config
        .dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("ordered-kv").join("logs"))
}

#[derive(Clone, Debug)]
struct LogEntry {
    path: PathBuf,
    modified: SystemTime,
}

#[derive(Clone, Debug, Default)]
struct PruneReport {
    candidates: usize,
    removed: usize,
    failed: usize,
}

fn prune_logs(dir: &Path, prefix: &str, max_files: usize) -> std::io::Result<PruneReport> {
    let mut entries = collect_log_entries(dir, prefix)?;
    let candidates = entries.len();
    let mut report = PruneReport {
        candidates,
        ..PruneReport::default()
    };
    for path in oldest_beyond(&mut entries, max_files) {
        match fs::remove_file(&path) {
            Ok(()) => report.removed += 1,
            Err(_) => report.failed += 1,
        }
    }
    Ok(report)
}

fn collect_log_entries(dir: &Path, prefix: &str) -> std::io::Result<Vec<LogEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !name.starts_with(prefix) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        entries.push(LogEntry { path, modified });
    }
    Ok(entries)
}

/// Removes all but the `max_files` newest entries and returns the removed
/// paths, oldest first.
fn oldest_beyond(entries: &mut Vec<LogEntry>, max_files: usize) -> Vec<PathBuf> {
    entries.sort_by_key(|entry| entry.modified);
    let excess = entries.len().saturating_sub(max_files);
    entries.drain(..excess).map(|entry| entry.path).collect()
}
