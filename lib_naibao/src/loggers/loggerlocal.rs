//! # Local Logging
//!
//! Console output plus an optional daily rotating file, both fed by one
//! `tracing` registry. The level comes from `RUST_LOG` when set, otherwise
//! from the configured level.

use glob::glob;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to prepare log directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid log file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("a global subscriber is already installed: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Prefix of the rolled files, usually the binary name.
    pub app_name: String,
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// File output is disabled without a directory.
    pub dir: Option<PathBuf>,
    /// Console lines as JSON instead of the human format.
    pub json: bool,
    /// Rolled files kept at startup, newest first.
    pub keep_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: "naibao_server".to_string(),
            level: "info".to_string(),
            dir: None,
            json: false,
            keep_files: 7,
        }
    }
}

/// Flushes buffered file output when dropped. Hold it for the life of the process.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Installs the global subscriber.
///
/// The file layer always writes JSON lines; the console layer follows
/// `config.json`. Fails if a subscriber has already been installed.
pub fn setup_logging(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let console = fmt::layer().with_target(true);
    if config.json {
        layers.push(console.json().boxed());
    } else {
        layers.push(console.with_ansi(true).boxed());
    }

    let mut file_guard = None;
    let mut pruned = 0;
    if let Some(dir) = &config.dir {
        std::fs::create_dir_all(dir)?;
        pruned = prune_old_logs(dir, &config.app_name, config.keep_files)?;

        let (writer, guard) = non_blocking(rolling::daily(dir, &config.app_name));
        layers.push(fmt::layer().with_ansi(false).with_writer(writer).json().boxed());
        file_guard = Some(guard);
    }

    tracing_subscriber::registry().with(layers).with(filter).try_init()?;

    info!(
        level = %config.level,
        dir = ?config.dir,
        pruned,
        "Logging initialized"
    );
    Ok(LoggingGuard { _file: file_guard })
}

/// Deletes rolled files for `app_name` in `dir` beyond the newest `keep`.
///
/// Daily file names end in an ISO date, so a descending name sort is newest
/// first. Returns how many files were removed.
pub fn prune_old_logs(dir: &Path, app_name: &str, keep: usize) -> Result<usize, LoggingError> {
    let pattern = format!("{}/{}.*", dir.display(), app_name);
    let mut log_files: Vec<PathBuf> = glob(&pattern)?.filter_map(Result::ok).collect();

    log_files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

    let mut removed = 0;
    for old_file in log_files.iter().skip(keep) {
        match std::fs::remove_file(old_file) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Error deleting old log file {}: {}", old_file.display(), e),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_prune_keeps_newest_files_for_the_app_only() {
        let dir = tempdir().unwrap();
        for day in ["2024-05-01", "2024-05-02", "2024-05-03", "2024-05-04"] {
            fs::write(dir.path().join(format!("naibao.{}", day)), "x").unwrap();
        }
        fs::write(dir.path().join("other.2024-05-01"), "x").unwrap();

        let removed = prune_old_logs(dir.path(), "naibao", 2).unwrap();
        assert_eq!(removed, 2);

        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec!["naibao.2024-05-03", "naibao.2024-05-04", "other.2024-05-01"]);
    }

    #[test]
    fn test_prune_with_fewer_files_than_kept_is_a_noop() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("naibao.2024-05-01"), "x").unwrap();
        assert_eq!(prune_old_logs(dir.path(), "naibao", 7).unwrap(), 0);
        assert_eq!(prune_old_logs(dir.path(), "missing", 0).unwrap(), 0);
    }

    #[test]
    fn test_invalid_level_is_rejected_before_install() {
        let config = LoggingConfig {
            level: "naibao=loudest".to_string(),
            ..Default::default()
        };
        if std::env::var("RUST_LOG").is_err() {
            assert!(matches!(setup_logging(&config), Err(LoggingError::Filter(_))));
        }
    }
}
