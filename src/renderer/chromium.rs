//! Chromium-based rendering engine using chromiumoxide.

use super::{RenderEngine, RenderEngineFactory};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::BrowserSettings;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("WEBGRAB_CHROME_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser", "chrome"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    let common: &[&str] = if cfg!(target_os = "macos") {
        &["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        &[]
    };
    common.iter().map(PathBuf::from).find(|p| p.exists())
}

/// Launches one headless Chromium per worker.
pub struct ChromiumFactory {
    settings: BrowserSettings,
    timeout: Duration,
}

impl ChromiumFactory {
    pub fn new(settings: BrowserSettings, timeout: Duration) -> Self {
        Self { settings, timeout }
    }
}

#[async_trait]
impl RenderEngineFactory for ChromiumFactory {
    async fn launch(&self) -> Result<Box<dyn RenderEngine>> {
        let engine = ChromiumEngine::launch(&self.settings, self.timeout).await?;
        Ok(Box::new(engine))
    }
}

/// A Chromium process with a single page.
pub struct ChromiumEngine {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    timeout: Duration,
}

impl ChromiumEngine {
    pub async fn launch(settings: &BrowserSettings, timeout: Duration) -> Result<Self> {
        let chrome_path = match &settings.chrome_path {
            Some(p) => p.clone(),
            None => find_chromium()
                .context("Chromium not found; pass --chrome-path or set WEBGRAB_CHROME_PATH")?,
        };
        let (w, h) = settings.window_size;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(w, h)
            .request_timeout(timeout)
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-notifications")
            .arg("--disable-background-networking")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--ignore-certificate-errors")
            .arg("--ignore-ssl-errors");
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create page")?;

        Ok(Self {
            browser,
            page,
            handler,
            timeout,
        })
    }
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    async fn load(&mut self, url: &str) -> Result<String> {
        // A failed navigation must not leave the previous host's page behind.
        if let Err(e) = self.page.goto("about:blank").await {
            tracing::debug!("blank reset failed: {e}");
        }
        match tokio::time::timeout(self.timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {:?}", self.timeout),
        }
        let title = self
            .page
            .get_title()
            .await
            .context("failed to read title")?
            .unwrap_or_default();
        Ok(title)
    }

    async fn page_source(&mut self) -> Result<String> {
        self.page.content().await.context("failed to read page source")
    }

    async fn execute_script(&mut self, script: &str) -> Result<serde_json::Value> {
        let result = tokio::time::timeout(self.timeout, self.page.evaluate(script))
            .await
            .context("script timed out")?
            .context("script execution failed")?;
        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert script result: {e:?}"))
    }

    async fn set_viewport(&mut self, width: u32, height: u32) -> Result<()> {
        let params =
            SetDeviceMetricsOverrideParams::new(i64::from(width), i64::from(height), 1.0, false);
        self.page
            .execute(params)
            .await
            .context("failed to resize viewport")?;
        Ok(())
    }

    async fn capture_screenshot(&mut self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.page
            .screenshot(params)
            .await
            .context("screenshot capture failed")
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        let _ = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_load_and_capture() {
        let settings = BrowserSettings {
            chrome_path: None,
            headless: true,
            window_size: (800, 600),
        };
        let mut engine = ChromiumEngine::launch(&settings, Duration::from_secs(10))
            .await
            .expect("failed to launch");

        let title = engine
            .load("data:text/html,<title>Metasys</title><h1>Hello</h1>")
            .await
            .expect("load failed");
        assert_eq!(title, "Metasys");

        let html = engine.page_source().await.expect("source failed");
        assert!(html.contains("<h1>Hello</h1>"));

        let png = engine.capture_screenshot().await.expect("capture failed");
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));

        Box::new(engine).close().await.expect("close failed");
    }
}
