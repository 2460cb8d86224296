use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use webgrab_scan::config::{HeaderLevel, JsonVerbosity, ScanConfig, ScreenshotFormat};
use webgrab_scan::error::ScanError;
use webgrab_scan::http::ReqwestFetcherFactory;
use webgrab_scan::progress::ProgressStore;
use webgrab_scan::renderer::chromium::ChromiumFactory;
use webgrab_scan::scanner::Scanner;
use webgrab_scan::sink::ResultSink;
use webgrab_scan::types::RunSummary;
use webgrab_scan::{logging, shutdown, targets};

/// webgrab-scan: screenshot, fingerprint and record the web interfaces of a host list.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "webgrab-scan",
    version,
    about = "Screenshot, fingerprint and record the web interfaces of a host list.",
    long_about = None
)]
struct Cli {
    /// File with one host per line (IP, hostname or IPv4 CIDR; `#` starts a comment).
    host_file: PathBuf,

    /// Concurrent workers, each with its own browser. 1 runs sequentially.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Per-request timeout budget in seconds.
    #[arg(long = "timeout-secs", default_value_t = 15)]
    timeout_secs: u64,

    /// Upper bound of the random delay before each host, in seconds.
    #[arg(long = "jitter-secs", default_value_t = 0.5)]
    jitter_secs: f64,

    /// Verify TLS certificates on metadata requests.
    #[arg(long = "verify-ssl", default_value_t = false)]
    verify_ssl: bool,

    /// Directory for all outputs, screenshots, progress and run logs.
    #[arg(long = "output-dir", default_value = "webgrab_output")]
    output_dir: PathBuf,

    #[arg(long = "excel-file", default_value = "results.xlsx")]
    excel_file: PathBuf,
    #[arg(long = "xml-file", default_value = "results.xml")]
    xml_file: PathBuf,
    #[arg(long = "csv-file", default_value = "results.csv")]
    csv_file: PathBuf,
    #[arg(long = "json-file", default_value = "results.json")]
    json_file: PathBuf,

    #[arg(long = "no-excel", default_value_t = false)]
    no_excel: bool,
    #[arg(long = "no-xml", default_value_t = false)]
    no_xml: bool,
    #[arg(long = "no-csv", default_value_t = false)]
    no_csv: bool,
    #[arg(long = "no-json", default_value_t = false)]
    no_json: bool,

    /// Skip hosts listed in the progress file.
    #[arg(long, default_value_t = false)]
    resume: bool,

    /// Completed-host ledger, relative to the output directory.
    #[arg(long = "progress-file", default_value = "processed_ips.txt")]
    progress_file: PathBuf,

    #[arg(long = "no-screenshots", default_value_t = false)]
    no_screenshots: bool,

    #[arg(long = "screenshot-format", value_enum, default_value_t = ScreenshotFormat::Png)]
    screenshot_format: ScreenshotFormat,

    /// JPEG quality (1-100).
    #[arg(long = "screenshot-quality", default_value_t = 50)]
    screenshot_quality: u8,

    /// Largest captured width or height in pixels; 0 applies only the safety cap.
    #[arg(long = "screenshot-max-size", default_value_t = 0)]
    screenshot_max_size: u32,

    /// Link screenshots from the workbook instead of embedding them.
    #[arg(long = "screenshots-external", default_value_t = false)]
    screenshots_external: bool,

    /// Delete screenshots older than this many days before scanning; 0 disables.
    #[arg(long = "cleanup-days", default_value_t = 0)]
    cleanup_days: u32,

    /// Response body bytes kept per probe.
    #[arg(long = "max-content-size", default_value_t = 5000)]
    max_content_size: usize,

    #[arg(long = "store-headers", value_enum, default_value_t = HeaderLevel::Essential)]
    store_headers: HeaderLevel,

    /// Compress stored bodies (zlib + base64) above 1000 bytes.
    #[arg(long, default_value_t = false)]
    compression: bool,

    /// Only titles and status codes per protocol in the JSON output.
    #[arg(long = "json-minimal", default_value_t = false)]
    json_minimal: bool,

    #[arg(long = "minify-json", default_value_t = false)]
    minify_json: bool,

    /// Browser binary; otherwise WEBGRAB_CHROME_PATH, then PATH.
    #[arg(long = "chrome-path")]
    chrome_path: Option<PathBuf>,

    /// Run the browser with a visible window.
    #[arg(long = "show-browser", default_value_t = false)]
    show_browser: bool,

    /// Log throughput every N finished hosts.
    #[arg(long = "progress-interval", default_value_t = 10)]
    progress_interval: u64,

    /// Seconds to wait for in-flight hosts after a stop request.
    #[arg(long = "shutdown-grace-secs", default_value_t = 30)]
    shutdown_grace_secs: u64,

    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> Result<ScanConfig> {
        let dir = self.output_dir.clone();
        let mut cfg = ScanConfig::with_output_dir(&dir);
        cfg.concurrency = self.concurrency;
        cfg.timeout = Duration::from_secs(self.timeout_secs);
        cfg.jitter = Duration::try_from_secs_f64(self.jitter_secs)
            .context("jitter must be a non-negative number of seconds")?;
        cfg.verify_ssl = self.verify_ssl;

        let enabled = |off: bool, file: &PathBuf| (!off).then(|| dir.join(file));
        cfg.output.excel = enabled(self.no_excel, &self.excel_file);
        cfg.output.xml = enabled(self.no_xml, &self.xml_file);
        cfg.output.csv = enabled(self.no_csv, &self.csv_file);
        cfg.output.json = enabled(self.no_json, &self.json_file);

        cfg.resume = self.resume;
        cfg.progress_file = dir.join(&self.progress_file);

        cfg.screenshots.enabled = !self.no_screenshots;
        cfg.screenshots.format = self.screenshot_format;
        cfg.screenshots.quality = self.screenshot_quality;
        cfg.screenshots.max_dimension = self.screenshot_max_size;
        cfg.screenshots.external = self.screenshots_external;
        cfg.screenshots.retention_days = self.cleanup_days;

        cfg.content.max_body_bytes = self.max_content_size;
        cfg.content.header_level = self.store_headers;
        cfg.content.compression = self.compression;
        cfg.content.json_verbosity = if self.json_minimal {
            JsonVerbosity::Minimal
        } else {
            JsonVerbosity::Full
        };
        cfg.content.minify_json = self.minify_json;

        cfg.browser.chrome_path = self.chrome_path;
        cfg.browser.headless = !self.show_browser;

        cfg.progress_interval = self.progress_interval;
        cfg.shutdown_grace = Duration::from_secs(self.shutdown_grace_secs);

        cfg.validate()?;
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let host_file = cli.host_file.clone();
    let log_level = cli.log_level.clone();
    let cfg = cli.into_config()?;

    let run_log = logging::init(&cfg.output.dir, &log_level)?;
    tracing::info!(run_log = %run_log.display(), "webgrab-scan v{}", env!("CARGO_PKG_VERSION"));
    cfg.log_summary();

    let hosts = targets::load_hosts_from_path(&host_file)
        .map_err(|e| ScanError::HostList(format!("{e:#}")))?;
    tracing::info!(file = %host_file.display(), hosts = hosts.len(), "loaded host list");

    let progress = Arc::new(ProgressStore::open(&cfg.progress_file, cfg.resume)?);
    tracing::info!(
        file = %progress.path().display(),
        completed = progress.completed_count(),
        "progress ledger ready"
    );
    let sink = Arc::new(ResultSink::open(&cfg).context("failed to open outputs")?);
    tracing::info!(formats = ?sink.formats(), "outputs ready");

    let engines = Arc::new(ChromiumFactory::new(cfg.browser.clone(), cfg.timeout));
    let fetchers = Arc::new(ReqwestFetcherFactory {
        verify_ssl: cfg.verify_ssl,
    });

    let cancel = CancellationToken::new();
    shutdown::install_signal_handlers(cancel.clone());

    let scanner = Scanner::new(cfg, engines, fetchers, sink, progress);
    let summary = scanner.run(hosts, cancel).await?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(s: &RunSummary) {
    let finished = s.completed + s.failed;
    println!("\nScan summary");
    println!("  processed    : {} / {}", finished, s.scheduled);
    println!("  completed    : {}", s.completed);
    println!("  failed       : {}", s.failed);
    println!("  skipped      : {}", s.skipped);
    println!("  elapsed      : {:.1}s", s.elapsed_seconds);
    if finished > 0 {
        println!("  avg per host : {:.2}s", s.elapsed_seconds / finished as f64);
    }
    if s.interrupted {
        println!("  interrupted  : {} host(s) remaining; rerun with --resume", s.remaining());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_maps_to_config() {
        let cli = Cli::parse_from([
            "webgrab-scan",
            "hosts.txt",
            "--concurrency",
            "8",
            "--no-xml",
            "--json-minimal",
            "--store-headers",
            "all",
            "--output-dir",
            "out",
        ]);
        let cfg = cli.into_config().unwrap();
        assert_eq!(cfg.concurrency, 8);
        assert!(cfg.output.xml.is_none());
        assert_eq!(cfg.output.excel, Some(PathBuf::from("out").join("results.xlsx")));
        assert_eq!(cfg.content.json_verbosity, JsonVerbosity::Minimal);
        assert_eq!(cfg.content.header_level, HeaderLevel::All);
        assert_eq!(cfg.progress_file, PathBuf::from("out").join("processed_ips.txt"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cli = Cli::parse_from(["webgrab-scan", "hosts.txt", "--concurrency", "0"]);
        assert!(cli.into_config().is_err());
        let cli = Cli::parse_from(["webgrab-scan", "hosts.txt", "--screenshot-quality", "0"]);
        assert!(cli.into_config().is_err());
    }
}
