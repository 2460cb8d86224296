use anyhow::{bail, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How much of the response header set is kept per probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HeaderLevel {
    /// Every header, plus content-length, content-type and cache-control fields.
    All,
    /// content-length, content-type, server and x-powered-by only.
    Essential,
    /// Nothing.
    None,
}

impl HeaderLevel {
    pub const ESSENTIAL_HEADERS: [&'static str; 4] =
        ["content-length", "content-type", "server", "x-powered-by"];

    pub fn keeps_header(self, name: &str) -> bool {
        match self {
            HeaderLevel::All => true,
            HeaderLevel::Essential => Self::ESSENTIAL_HEADERS
                .iter()
                .any(|h| h.eq_ignore_ascii_case(name)),
            HeaderLevel::None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotFormat {
    Png,
    Jpg,
}

impl ScreenshotFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ScreenshotFormat::Png => "png",
            ScreenshotFormat::Jpg => "jpg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum JsonVerbosity {
    Minimal,
    Full,
}

/// Which output files are written, as full paths. `None` disables a representation.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub excel: Option<PathBuf>,
    pub xml: Option<PathBuf>,
    pub csv: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

impl OutputConfig {
    /// All four representations under `dir` with their default file names.
    pub fn all_in(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            excel: Some(dir.join("results.xlsx")),
            xml: Some(dir.join("results.xml")),
            csv: Some(dir.join("results.csv")),
            json: Some(dir.join("results.json")),
            dir,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScreenshotConfig {
    pub enabled: bool,
    pub format: ScreenshotFormat,
    /// JPEG quality, 1..=100.
    pub quality: u8,
    /// Largest captured width or height in pixels; 0 applies only the safety cap.
    pub max_dimension: u32,
    /// Link screenshots from the workbook instead of embedding them.
    pub external: bool,
    /// Delete screenshots older than this many days at startup; 0 disables.
    pub retention_days: u32,
    pub dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ContentConfig {
    /// Body bytes kept per probe; 0 keeps nothing.
    pub max_body_bytes: usize,
    pub header_level: HeaderLevel,
    pub compression: bool,
    pub json_verbosity: JsonVerbosity,
    pub minify_json: bool,
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub window_size: (u32, u32),
}

/// Everything the library needs to run a scan.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Concurrent workers; 1 runs sequentially on the calling task.
    pub concurrency: usize,
    /// Per-request timeout budget.
    pub timeout: Duration,
    /// Upper bound of the random delay before each host.
    pub jitter: Duration,
    pub verify_ssl: bool,
    pub output: OutputConfig,
    /// Skip hosts already listed in the progress file.
    pub resume: bool,
    pub progress_file: PathBuf,
    pub screenshots: ScreenshotConfig,
    pub content: ContentConfig,
    pub browser: BrowserSettings,
    /// Log throughput every this many finished hosts.
    pub progress_interval: u64,
    /// How long to wait for in-flight hosts after a stop request.
    pub shutdown_grace: Duration,
}

impl ScanConfig {
    /// Defaults rooted at `output_dir`.
    pub fn with_output_dir(output_dir: impl AsRef<Path>) -> Self {
        let dir = output_dir.as_ref().to_path_buf();
        Self {
            concurrency: 4,
            timeout: Duration::from_secs(15),
            jitter: Duration::from_millis(500),
            verify_ssl: false,
            output: OutputConfig::all_in(&dir),
            resume: false,
            progress_file: dir.join("processed_ips.txt"),
            screenshots: ScreenshotConfig {
                enabled: true,
                format: ScreenshotFormat::Png,
                quality: 50,
                max_dimension: 0,
                external: false,
                retention_days: 0,
                dir: dir.join("screenshots"),
            },
            content: ContentConfig {
                max_body_bytes: 5000,
                header_level: HeaderLevel::Essential,
                compression: false,
                json_verbosity: JsonVerbosity::Full,
                minify_json: false,
            },
            browser: BrowserSettings {
                chrome_path: None,
                headless: true,
                window_size: (1920, 1080),
            },
            progress_interval: 10,
            shutdown_grace: Duration::from_secs(30),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.timeout.is_zero() {
            bail!("timeout must be greater than zero");
        }
        if !(1..=100).contains(&self.screenshots.quality) {
            bail!(
                "screenshot quality must be within 1..=100, got {}",
                self.screenshots.quality
            );
        }
        if self.progress_interval == 0 {
            bail!("progress interval must be at least 1");
        }
        Ok(())
    }

    /// Emit the effective settings to the run log.
    pub fn log_summary(&self) {
        tracing::info!("--- scan configuration ---");
        tracing::info!(
            concurrency = self.concurrency,
            timeout_s = self.timeout.as_secs_f64(),
            jitter_s = self.jitter.as_secs_f64(),
            verify_ssl = self.verify_ssl,
            "core"
        );
        tracing::info!(
            dir = %self.output.dir.display(),
            excel = self.output.excel.is_some(),
            xml = self.output.xml.is_some(),
            csv = self.output.csv.is_some(),
            json = self.output.json.is_some(),
            "outputs"
        );
        tracing::info!(
            resume = self.resume,
            progress_file = %self.progress_file.display(),
            "resume"
        );
        if self.screenshots.enabled {
            tracing::info!(
                format = self.screenshots.format.extension(),
                quality = self.screenshots.quality,
                max_dimension = self.screenshots.max_dimension,
                external = self.screenshots.external,
                retention_days = self.screenshots.retention_days,
                "screenshots"
            );
        } else {
            tracing::info!("screenshots disabled");
        }
        tracing::info!(
            max_body_bytes = self.content.max_body_bytes,
            headers = ?self.content.header_level,
            compression = self.content.compression,
            json = ?self.content.json_verbosity,
            minify_json = self.content.minify_json,
            "content"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ScanConfig::with_output_dir("out");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.progress_file, PathBuf::from("out").join("processed_ips.txt"));
        assert_eq!(cfg.screenshots.dir, PathBuf::from("out").join("screenshots"));
    }

    #[test]
    fn rejects_zero_concurrency_and_bad_quality() {
        let mut cfg = ScanConfig::with_output_dir("out");
        cfg.concurrency = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ScanConfig::with_output_dir("out");
        cfg.screenshots.quality = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn essential_headers_are_case_insensitive() {
        assert!(HeaderLevel::Essential.keeps_header("Server"));
        assert!(HeaderLevel::Essential.keeps_header("Content-Type"));
        assert!(!HeaderLevel::Essential.keeps_header("Cache-Control"));
        assert!(HeaderLevel::All.keeps_header("Cache-Control"));
        assert!(!HeaderLevel::None.keeps_header("server"));
    }
}
