//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use webgrab_scan::config::ScanConfig;
use webgrab_scan::error::FetchError;
use webgrab_scan::http::{FetchTimeouts, FetchedResponse, FetcherFactory, HttpFetcher};
use webgrab_scan::renderer::{RenderEngine, RenderEngineFactory};

/// Quiet, fast configuration rooted at `dir`.
pub fn test_config(dir: &Path) -> ScanConfig {
    let mut cfg = ScanConfig::with_output_dir(dir);
    cfg.jitter = Duration::ZERO;
    cfg.timeout = Duration::from_secs(2);
    cfg.screenshots.enabled = false;
    cfg.shutdown_grace = Duration::from_secs(2);
    cfg
}

/// Pages keyed by URL: `(title, source)`. Unknown URLs fail to load.
#[derive(Clone, Default)]
pub struct Pages(pub Arc<HashMap<String, (String, String)>>);

impl Pages {
    pub fn with(entries: &[(&str, &str, &str)]) -> Self {
        let map = entries
            .iter()
            .map(|(url, title, source)| (url.to_string(), (title.to_string(), source.to_string())))
            .collect();
        Self(Arc::new(map))
    }
}

pub struct FakeEngine {
    pages: Pages,
    current: Option<(String, String)>,
    loads: Arc<Mutex<Vec<String>>>,
    load_delay: Duration,
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn load(&mut self, url: &str) -> Result<String> {
        self.loads.lock().unwrap().push(url.to_string());
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        self.current = self.pages.0.get(url).cloned();
        self.current
            .as_ref()
            .map(|(t, _)| t.clone())
            .ok_or_else(|| anyhow!("net::ERR_CONNECTION_REFUSED"))
    }

    async fn page_source(&mut self) -> Result<String> {
        Ok(self.current.as_ref().map(|(_, s)| s.clone()).unwrap_or_default())
    }

    async fn execute_script(&mut self, _script: &str) -> Result<serde_json::Value> {
        Ok(serde_json::json!([1024, 768]))
    }

    async fn set_viewport(&mut self, _width: u32, _height: u32) -> Result<()> {
        Ok(())
    }

    async fn capture_screenshot(&mut self) -> Result<Vec<u8>> {
        Err(anyhow!("capture not supported"))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakeEngines {
    pub pages: Pages,
    pub fail_launch: bool,
    pub load_delay: Duration,
    pub launches: Arc<AtomicUsize>,
    /// Every URL handed to any engine, in call order.
    pub loads: Arc<Mutex<Vec<String>>>,
}

impl FakeEngines {
    pub fn new(pages: Pages) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }

    pub fn loaded_urls(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }
}

#[async_trait]
impl RenderEngineFactory for FakeEngines {
    async fn launch(&self) -> Result<Box<dyn RenderEngine>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail_launch {
            return Err(anyhow!("browser binary not found"));
        }
        Ok(Box::new(FakeEngine {
            pages: self.pages.clone(),
            current: None,
            loads: self.loads.clone(),
            load_delay: self.load_delay,
        }))
    }
}

/// Answers GETs from a URL table; everything else is refused.
pub struct FakeFetcher {
    responses: Arc<HashMap<String, FetchedResponse>>,
}

#[async_trait]
impl HttpFetcher for FakeFetcher {
    async fn get(&self, url: &str, _timeouts: FetchTimeouts) -> Result<FetchedResponse, FetchError> {
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Connect("connection refused".into()))
    }

    async fn head(&self, url: &str, _timeout: Duration) -> Result<u16, FetchError> {
        self.responses
            .get(url)
            .map(|r| r.status)
            .ok_or_else(|| FetchError::Connect("connection refused".into()))
    }
}

#[derive(Clone, Default)]
pub struct FakeFetchers {
    pub responses: Arc<HashMap<String, FetchedResponse>>,
}

impl FakeFetchers {
    pub fn with(entries: Vec<(&str, FetchedResponse)>) -> Self {
        let map = entries.into_iter().map(|(u, r)| (u.to_string(), r)).collect();
        Self {
            responses: Arc::new(map),
        }
    }
}

impl FetcherFactory for FakeFetchers {
    fn build(&self) -> Result<Box<dyn HttpFetcher>> {
        Ok(Box::new(FakeFetcher {
            responses: self.responses.clone(),
        }))
    }
}

pub fn response(status: u16, headers: &[(&str, &str)], body: &str) -> FetchedResponse {
    FetchedResponse {
        status,
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        body: body.to_string(),
    }
}

pub fn hosts(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
