//! One protocol attempt against one host: rendered load, screenshot, metadata
//! fetch and classification.

pub mod body;
pub mod escalation;

use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::artifacts;
use crate::classifier;
use crate::config::ScanConfig;
use crate::http::HttpFetcher;
use crate::renderer::{self, RenderEngine};
use crate::types::{ProbeOutcome, Protocol};
use body::{body_excerpt, header_fields};
use escalation::{run_fetch, FetchPlan};

/// Hard limit for captured width and height regardless of configuration.
pub const SCREENSHOT_SAFETY_CAP: (u32, u32) = (8000, 15000);
const VIEWPORT_PADDING: (u32, u32) = (50, 100);
const RESIZE_SETTLE: Duration = Duration::from_millis(500);
const INTERSTITIAL_SETTLE: Duration = Duration::from_millis(1500);
const INTERSTITIAL_LIMIT: Duration = Duration::from_secs(5);

/// Owns one worker's rendering engine and HTTP client.
pub struct Prober {
    worker: usize,
    engine: Box<dyn RenderEngine>,
    fetcher: Box<dyn HttpFetcher>,
    config: Arc<ScanConfig>,
}

impl Prober {
    pub fn new(
        worker: usize,
        engine: Box<dyn RenderEngine>,
        fetcher: Box<dyn HttpFetcher>,
        config: Arc<ScanConfig>,
    ) -> Self {
        Self {
            worker,
            engine,
            fetcher,
            config,
        }
    }

    /// Probe `protocol://host`. Never fails: unreachable hosts produce an outcome
    /// with `loaded == false` and empty metadata.
    pub async fn probe(&mut self, host: &str, protocol: Protocol) -> ProbeOutcome {
        let url = protocol.url_for(host);
        let mut outcome = ProbeOutcome::unreachable(protocol);

        match self.engine.load(&url).await {
            Ok(title) => {
                outcome.loaded = true;
                outcome.title = title;
                if renderer::dismiss_interstitial(self.engine.as_mut(), INTERSTITIAL_LIMIT).await {
                    tracing::debug!(worker = self.worker, %url, "clicked through security warning");
                    time::sleep(INTERSTITIAL_SETTLE).await;
                    if let Ok(serde_json::Value::String(t)) =
                        self.engine.execute_script("document.title").await
                    {
                        outcome.title = t;
                    }
                }
            }
            Err(e) => {
                tracing::debug!(worker = self.worker, %url, "render failed: {e:#}");
            }
        }

        let source = self.engine.page_source().await.unwrap_or_default();
        let interstitial = renderer::looks_like_interstitial(&source);
        let rendered = if outcome.loaded || interstitial {
            source
        } else {
            String::new()
        };

        if self.config.screenshots.enabled && (outcome.loaded || interstitial) {
            outcome.screenshot = self.screenshot(host, protocol).await;
        }

        let budget = self.config.timeout;
        let report = run_fetch(self.fetcher.as_ref(), &url, FetchPlan::for_budget(budget)).await;
        outcome.elapsed_seconds = report.elapsed.as_secs_f64();
        if report.elapsed > budget.mul_f64(0.9) {
            tracing::warn!(
                worker = self.worker,
                %url,
                elapsed_s = outcome.elapsed_seconds,
                budget_s = budget.as_secs_f64(),
                "metadata fetch used most of its timeout budget"
            );
        }

        let mut full_body = String::new();
        let mut full_headers = Vec::new();
        match report.response {
            Some(resp) => {
                outcome.status_code = Some(resp.status);
                let fields = header_fields(&resp, self.config.content.header_level);
                outcome.content_length = fields.content_length;
                outcome.content_type = fields.content_type;
                outcome.cache_control = fields.cache_control;
                outcome.headers = fields.snapshot;
                let (excerpt, compressed) = body_excerpt(&resp.body, &self.config.content);
                outcome.body_excerpt = excerpt;
                outcome.body_compressed = compressed;
                full_body = resp.body;
                full_headers = resp.headers;
            }
            None => {
                outcome.fetch_error = report.error.map(|e| e.to_string());
            }
        }

        let body = if rendered.is_empty() { &full_body } else { &rendered };
        outcome.classification = classifier::classify(&outcome.title, body, &full_headers);

        tracing::info!(
            worker = self.worker,
            %url,
            loaded = outcome.loaded,
            status = ?outcome.status_code,
            classification = %outcome.classification,
            "probe finished"
        );
        outcome
    }

    /// Resize to the rendered content, capture and persist. Failures are logged and yield `None`.
    async fn screenshot(&mut self, host: &str, protocol: Protocol) -> Option<std::path::PathBuf> {
        let window = self.config.browser.window_size;
        let (w, h) = match renderer::content_size(self.engine.as_mut()).await {
            Ok((w, h)) if w > 0 && h > 0 => (w, h),
            Ok(_) => window,
            Err(e) => {
                tracing::debug!(host, "content size unavailable: {e:#}");
                window
            }
        };
        let (w, h) = clamp_capture(w, h, self.config.screenshots.max_dimension);

        if let Err(e) = self
            .engine
            .set_viewport(w + VIEWPORT_PADDING.0, h + VIEWPORT_PADDING.1)
            .await
        {
            tracing::debug!(host, "viewport resize failed: {e:#}");
        }
        time::sleep(RESIZE_SETTLE).await;

        let captured = self.engine.capture_screenshot().await;
        if let Err(e) = self.engine.set_viewport(window.0, window.1).await {
            tracing::debug!(host, "viewport restore failed: {e:#}");
        }
        let png = match captured {
            Ok(png) => png,
            Err(e) => {
                tracing::warn!(host, %protocol, "screenshot failed: {e:#}");
                return None;
            }
        };

        let cfg = self.config.screenshots.clone();
        let host_owned = host.to_string();
        let saved = tokio::task::spawn_blocking(move || {
            artifacts::save_screenshot(&png, &cfg, protocol, &host_owned)
        })
        .await;
        match saved {
            Ok(Ok(path)) => Some(path),
            Ok(Err(e)) => {
                tracing::warn!(host, %protocol, "failed to save screenshot: {e:#}");
                None
            }
            Err(e) => {
                tracing::warn!(host, %protocol, "screenshot task failed: {e}");
                None
            }
        }
    }

    pub async fn close(self) {
        if let Err(e) = self.engine.close().await {
            tracing::debug!(worker = self.worker, "engine close failed: {e:#}");
        }
    }
}

/// Clamp capture dimensions to `max_dimension` (0 = no limit) and the safety cap.
pub fn clamp_capture(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let (mut w, mut h) = (width, height);
    if max_dimension > 0 {
        w = w.min(max_dimension);
        h = h.min(max_dimension);
    }
    (w.min(SCREENSHOT_SAFETY_CAP.0), h.min(SCREENSHOT_SAFETY_CAP.1))
}
