use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::config::{ScreenshotConfig, ScreenshotFormat};
use crate::types::Protocol;

/// Replace anything outside `[A-Za-z0-9_.-]` so a host can be used in a file name.
pub fn sanitize_host(host: &str) -> String {
    host.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `<protocol>_<host>_<unix millis>.<ext>` inside the screenshot directory.
pub fn screenshot_path(cfg: &ScreenshotConfig, protocol: Protocol, host: &str) -> PathBuf {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    cfg.dir.join(format!(
        "{}_{}_{}.{}",
        protocol.scheme(),
        sanitize_host(host),
        millis,
        cfg.format.extension()
    ))
}

/// Persist a PNG capture, re-encoding to JPEG when configured. Returns the written path.
pub fn save_screenshot(
    png: &[u8],
    cfg: &ScreenshotConfig,
    protocol: Protocol,
    host: &str,
) -> Result<PathBuf> {
    fs::create_dir_all(&cfg.dir)
        .with_context(|| format!("failed to create {}", cfg.dir.display()))?;
    let path = screenshot_path(cfg, protocol, host);

    match cfg.format {
        ScreenshotFormat::Png => {
            fs::write(&path, png).with_context(|| format!("failed to write {}", path.display()))?;
        }
        ScreenshotFormat::Jpg => {
            let img = image::load_from_memory(png).context("failed to decode capture")?;
            let rgb = image::DynamicImage::ImageRgb8(img.to_rgb8());
            let file = fs::File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            let encoder = JpegEncoder::new_with_quality(&mut writer, cfg.quality);
            rgb.write_with_encoder(encoder)
                .with_context(|| format!("failed to encode {}", path.display()))?;
            writer
                .flush()
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
    }
    Ok(path)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStats {
    pub removed: usize,
    pub failed: usize,
}

/// Delete regular files in `dir` last modified more than `max_age_days` ago.
/// Stops early when `cancel` fires.
pub fn cleanup_old_screenshots(
    dir: &Path,
    max_age_days: u32,
    cancel: &CancellationToken,
) -> Result<CleanupStats> {
    let mut stats = CleanupStats::default();
    if !dir.exists() {
        tracing::info!(dir = %dir.display(), "screenshot directory not found, skipping cleanup");
        return Ok(stats);
    }
    let max_age = Duration::from_secs(u64::from(max_age_days) * 86_400);
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    tracing::info!(dir = %dir.display(), max_age_days, "cleaning up old screenshots");
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        if cancel.is_cancelled() {
            tracing::warn!("stop requested during screenshot cleanup");
            break;
        }
        let Ok(entry) = entry else {
            stats.failed += 1;
            continue;
        };
        let path = entry.path();
        let modified = match entry.metadata() {
            Ok(m) if m.is_file() => m.modified().ok(),
            _ => continue,
        };
        if modified.is_some_and(|t| t < cutoff) {
            match fs::remove_file(&path) {
                Ok(()) => {
                    stats.removed += 1;
                    tracing::debug!(file = %path.display(), "removed old screenshot");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    stats.failed += 1;
                    tracing::error!(file = %path.display(), "failed to remove old screenshot: {e}");
                }
            }
        }
    }

    match stats {
        CleanupStats { removed: 0, failed: 0 } => tracing::info!("no old screenshots to clean up"),
        CleanupStats { removed, failed } => {
            tracing::info!(removed, "cleaned up old screenshots");
            if failed > 0 {
                tracing::warn!(failed, "some old screenshots could not be removed");
            }
        }
    }
    Ok(stats)
}
