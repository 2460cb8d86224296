use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// `webgrab_<YYYYmmdd_HHMMSS>.log` inside `dir`, timestamped in UTC.
pub fn run_log_path(dir: &Path) -> PathBuf {
    let stamp = OffsetDateTime::now_utc()
        .format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_else(|_| "run".to_string());
    dir.join(format!("webgrab_{stamp}.log"))
}

/// Log to stdout and to a per-run file in `dir`. `RUST_LOG` overrides `level`.
/// Returns the run log path.
pub fn init(dir: &Path, level: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = run_log_path(dir);
    let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("logging already initialised")?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_name_is_timestamped() {
        let p = run_log_path(Path::new("out"));
        let name = p.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("webgrab_") && name.ends_with(".log"));
        assert_eq!(name.len(), "webgrab_20250101_120000.log".len());
    }
}
