use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const LOG_FILTER_ENV: &str = "RALFINHO_LOG";
const LOG_FILE_ENV: &str = "RALFINHO_LOG_FILE";
const DEFAULT_FILTER: &str = "info";

/// Where log records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

impl LogTarget {
    /// `RALFINHO_LOG_FILE` wins over the target picked by the caller.
    pub fn resolve(default: LogTarget) -> LogTarget {
        std::env::var(LOG_FILE_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|value| LogTarget::File(PathBuf::from(value)))
            .unwrap_or(default)
    }

    /// Dashboard sessions own the terminal, so they log next to the run.
    pub fn for_dashboard(run_dir: &Path) -> LogTarget {
        LogTarget::resolve(LogTarget::File(run_dir.join(crate::store::LOG_FILE)))
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init(target: LogTarget) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true);

    let installed = match target {
        LogTarget::Stderr => builder.with_writer(std::io::stderr).try_init(),
        LogTarget::File(path) => {
            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => builder
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init(),
                Err(err) => {
                    eprintln!("ralfinho: cannot open log file {}: {err}", path.display());
                    return;
                }
            }
        }
    };

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
