//! Rendering-engine collaborator.
//!
//! Defines the `RenderEngine` trait that abstracts over the browser used for page
//! loads and screenshots (Chromium via chromiumoxide), plus best-effort helpers
//! built on top of it.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time;

/// One browser instance owned by a single worker.
#[async_trait]
pub trait RenderEngine: Send {
    /// Navigate to `url`. `Ok` carries the page title once a page was produced.
    async fn load(&mut self, url: &str) -> Result<String>;
    /// HTML of whatever page is currently shown, including error and warning pages.
    async fn page_source(&mut self) -> Result<String>;
    /// Run a script in the page and return its JSON result.
    async fn execute_script(&mut self, script: &str) -> Result<serde_json::Value>;
    /// Resize the rendering viewport.
    async fn set_viewport(&mut self, width: u32, height: u32) -> Result<()>;
    /// PNG capture of the current viewport.
    async fn capture_screenshot(&mut self) -> Result<Vec<u8>>;
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Starts engines; a failing `launch` is fatal for the run.
#[async_trait]
pub trait RenderEngineFactory: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn RenderEngine>>;
}

const INTERSTITIAL_PHRASES: [&str; 3] = [
    "your connection is not private",
    "proceed to",
    "not secure",
];

const CONTENT_SIZE_SCRIPT: &str = "(() => { const b = document.body || {}, d = document.documentElement || {}; \
     return [Math.max(b.scrollWidth||0, d.scrollWidth||0, b.offsetWidth||0, d.offsetWidth||0, b.clientWidth||0, d.clientWidth||0), \
             Math.max(b.scrollHeight||0, d.scrollHeight||0, b.offsetHeight||0, d.offsetHeight||0, b.clientHeight||0, d.clientHeight||0)]; })()";

const DISMISS_SCRIPT: &str = "(() => { const terms = ['proceed', 'advanced', 'continue']; \
     const els = Array.from(document.querySelectorAll('button, a')); \
     for (const t of terms) { const el = els.find(e => (e.id || '').toLowerCase().includes(t) || (e.textContent || '').toLowerCase().includes(t)); \
       if (el) { el.click(); return true; } } return false; })()";

/// Does this page look like a browser security warning.
pub fn looks_like_interstitial(source: &str) -> bool {
    let lower = source.to_lowercase();
    INTERSTITIAL_PHRASES.iter().any(|p| lower.contains(p))
}

/// Try once to click through a TLS warning page. Never fails; returns whether a
/// candidate was clicked.
pub async fn dismiss_interstitial(engine: &mut dyn RenderEngine, limit: Duration) -> bool {
    let attempt = async {
        let source = engine.page_source().await?;
        if !looks_like_interstitial(&source) {
            return Ok::<bool, anyhow::Error>(false);
        }
        let clicked = engine.execute_script(DISMISS_SCRIPT).await?;
        Ok(clicked.as_bool().unwrap_or(false))
    };
    match time::timeout(limit, attempt).await {
        Ok(Ok(clicked)) => clicked,
        Ok(Err(e)) => {
            tracing::debug!("interstitial dismissal failed: {e}");
            false
        }
        Err(_) => {
            tracing::debug!("interstitial dismissal timed out");
            false
        }
    }
}

/// Rendered content size in CSS pixels.
pub async fn content_size(engine: &mut dyn RenderEngine) -> Result<(u32, u32)> {
    let value = engine.execute_script(CONTENT_SIZE_SCRIPT).await?;
    let dims = value
        .as_array()
        .filter(|a| a.len() == 2)
        .ok_or_else(|| anyhow::anyhow!("unexpected content size result: {value}"))?;
    let px = |v: &serde_json::Value| v.as_f64().unwrap_or(0.0).max(0.0).round() as u32;
    Ok((px(&dims[0]), px(&dims[1])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interstitial_detection() {
        assert!(looks_like_interstitial(
            "<h1>Your connection is not private</h1>"
        ));
        assert!(!looks_like_interstitial("<title>Metasys</title>"));
    }
}
