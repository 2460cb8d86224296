//! HTTP client collaborator used for response metadata.
//!
//! Not a browser: plain GET/HEAD requests with bounded timeouts and retry on
//! 500/502/504. Certificate checks are optional since most embedded devices
//! serve self-signed certificates.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{self, Instant};

use crate::error::FetchError;

/// Status, headers and body of a completed GET.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedResponse {
    pub status: u16,
    /// Every response header, names lowercased, in arrival order.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl FetchedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Time limits for one GET: `connect` bounds the wait for the response head,
/// `total` bounds the whole exchange including the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTimeouts {
    pub connect: Duration,
    pub total: Duration,
}

impl FetchTimeouts {
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            connect: timeout,
            total: timeout,
        }
    }
}

#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get(&self, url: &str, timeouts: FetchTimeouts) -> Result<FetchedResponse, FetchError>;
    /// Lightweight liveness check; returns the status code.
    async fn head(&self, url: &str, timeout: Duration) -> Result<u16, FetchError>;
}

/// Builds one fetcher per worker.
pub trait FetcherFactory: Send + Sync {
    fn build(&self) -> anyhow::Result<Box<dyn HttpFetcher>>;
}

const RETRY_STATUSES: [u16; 3] = [500, 502, 504];
/// Bodies beyond this are cut; device pages are far smaller.
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// reqwest-backed fetcher with status retry and exponential backoff.
pub struct ReqwestFetcher {
    client: reqwest::Client,
    max_retries: u32,
    backoff_base: Duration,
}

impl ReqwestFetcher {
    pub fn new(verify_ssl: bool) -> anyhow::Result<Self> {
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                  AppleWebKit/537.36 (KHTML, like Gecko) \
                  Chrome/131.0.0.0 Safari/537.36";

        // Embedded controllers still ship TLS 1.0 stacks and self-signed certificates.
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(!verify_ssl)
            .danger_accept_invalid_hostnames(!verify_ssl)
            .min_protocol_version(Some(native_tls::Protocol::Tlsv10))
            .build()?;

        let client = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(ua)
            .build()?;

        Ok(Self {
            client,
            max_retries: 3,
            backoff_base: Duration::from_millis(300),
        })
    }

    async fn get_once(
        &self,
        url: &str,
        timeouts: FetchTimeouts,
    ) -> Result<reqwest::Response, FetchError> {
        let send = self.client.get(url).timeout(timeouts.total).send();
        match time::timeout(timeouts.connect, send).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(e)) => Err(map_reqwest_error(e)),
            Err(_) => Err(FetchError::Timeout),
        }
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &str, timeouts: FetchTimeouts) -> Result<FetchedResponse, FetchError> {
        let start = Instant::now();
        let mut retries = 0u32;

        loop {
            let resp = self.get_once(url, timeouts).await?;
            let status = resp.status().as_u16();

            if RETRY_STATUSES.contains(&status) && retries < self.max_retries {
                retries += 1;
                let delay = self.backoff_base * 2u32.pow(retries - 1);
                if start.elapsed() + delay < timeouts.total {
                    time::sleep(delay).await;
                    continue;
                }
            }

            let headers: Vec<(String, String)> = resp
                .headers()
                .iter()
                .map(|(k, v)| {
                    (
                        k.as_str().to_string(),
                        String::from_utf8_lossy(v.as_bytes()).into_owned(),
                    )
                })
                .collect();

            let remaining = timeouts.total.saturating_sub(start.elapsed());
            let body = match time::timeout(remaining, read_capped(resp, MAX_BODY_BYTES)).await {
                Ok(Ok((bytes, truncated))) => {
                    if truncated {
                        tracing::debug!(url, cap = MAX_BODY_BYTES, "body truncated");
                    }
                    String::from_utf8_lossy(&bytes).into_owned()
                }
                Ok(Err(e)) => {
                    tracing::debug!(url, "body read failed: {e}");
                    String::new()
                }
                Err(_) => {
                    tracing::debug!(url, "body read timed out");
                    String::new()
                }
            };

            return Ok(FetchedResponse {
                status,
                headers,
                body,
            });
        }
    }

    async fn head(&self, url: &str, timeout: Duration) -> Result<u16, FetchError> {
        let resp = self
            .client
            .head(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Ok(resp.status().as_u16())
    }
}

/// Read the body chunk by chunk, stopping at `cap` bytes. The flag reports a cut.
async fn read_capped(mut resp: reqwest::Response, cap: usize) -> reqwest::Result<(Vec<u8>, bool)> {
    let mut buf = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        if !append_capped(&mut buf, &chunk, cap) {
            return Ok((buf, true));
        }
    }
    Ok((buf, false))
}

/// Returns false once `buf` is full and some of `chunk` was dropped.
fn append_capped(buf: &mut Vec<u8>, chunk: &[u8], cap: usize) -> bool {
    let take = cap.saturating_sub(buf.len()).min(chunk.len());
    buf.extend_from_slice(&chunk[..take]);
    take == chunk.len()
}

fn map_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::Connect(e.to_string())
    } else {
        FetchError::Other(e.to_string())
    }
}

/// Factory producing a [`ReqwestFetcher`] per worker.
pub struct ReqwestFetcherFactory {
    pub verify_ssl: bool,
}

impl FetcherFactory for ReqwestFetcherFactory {
    fn build(&self) -> anyhow::Result<Box<dyn HttpFetcher>> {
        Ok(Box::new(ReqwestFetcher::new(self.verify_ssl)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetcher_builds_with_and_without_verification() {
        assert!(ReqwestFetcher::new(false).is_ok());
        assert!(ReqwestFetcher::new(true).is_ok());
    }

    #[test]
    fn header_lookup_ignores_case() {
        let resp = FetchedResponse {
            status: 200,
            headers: vec![("content-type".into(), "text/html".into())],
            body: String::new(),
        };
        assert_eq!(resp.header("Content-Type"), Some("text/html"));
        assert_eq!(resp.header("server"), None);
    }

    #[tokio::test]
    async fn unreachable_host_reports_an_error() {
        let fetcher = ReqwestFetcher::new(false).unwrap();
        // Port 9 on localhost is almost never open; either refusal or timeout is fine.
        let res = fetcher
            .get(
                "http://127.0.0.1:9",
                FetchTimeouts::uniform(Duration::from_millis(500)),
            )
            .await;
        assert!(res.is_err());
    }

    #[test]
    fn capped_append_stops_at_limit() {
        let mut buf = Vec::new();
        assert!(append_capped(&mut buf, b"abcd", 6));
        assert!(!append_capped(&mut buf, b"efgh", 6));
        assert_eq!(buf, b"abcdef");
        assert!(!append_capped(&mut buf, b"i", 6));
        assert_eq!(buf.len(), 6);
        // A chunk that exactly fills the buffer is not a cut.
        let mut exact = Vec::new();
        assert!(append_capped(&mut exact, b"abcdef", 6));
    }

    #[tokio::test]
    async fn oversized_body_is_cut_at_limit() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body_len = MAX_BODY_BYTES + 64 * 1024;
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut req = [0u8; 1024];
            let _ = sock.read(&mut req).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: {body_len}\r\nconnection: close\r\n\r\n"
            );
            sock.write_all(head.as_bytes()).await.unwrap();
            let _ = sock.write_all(&vec![b'a'; body_len]).await;
        });

        let fetcher = ReqwestFetcher::new(false).unwrap();
        let resp = fetcher
            .get(
                &format!("http://{addr}/"),
                FetchTimeouts::uniform(Duration::from_secs(5)),
            )
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body.len(), MAX_BODY_BYTES);
    }
}
