use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Label the classifier returns when nothing matched.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// A host to probe: an IP address or hostname, exactly as read from the input list.
pub type HostTarget = String;

/// Which scheme a probe attempt used.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// `http://`
    Plain,
    /// `https://`
    Encrypted,
}

impl Protocol {
    pub fn scheme(self) -> &'static str {
        match self {
            Protocol::Plain => "http",
            Protocol::Encrypted => "https",
        }
    }

    pub fn url_for(self, host: &str) -> String {
        format!("{}://{}", self.scheme(), host)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Result of one protocol attempt against one host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub protocol: Protocol,
    /// Did the renderer produce a page.
    pub loaded: bool,
    pub title: String,
    pub screenshot: Option<PathBuf>,
    pub status_code: Option<u16>,
    pub content_length: Option<String>,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    /// Size-capped body text; base64 zlib data when `body_compressed` is set.
    pub body_excerpt: String,
    pub body_compressed: bool,
    /// Header snapshot, already reduced to the configured verbosity level.
    pub headers: Vec<(String, String)>,
    pub classification: String,
    /// Wall-clock seconds spent on the metadata fetch.
    pub elapsed_seconds: f64,
    /// Why the metadata fetch produced no response, if it did not.
    pub fetch_error: Option<String>,
}

impl ProbeOutcome {
    /// An outcome with nothing loaded and nothing fetched.
    pub fn unreachable(protocol: Protocol) -> Self {
        Self {
            protocol,
            loaded: false,
            title: String::new(),
            screenshot: None,
            status_code: None,
            content_length: None,
            content_type: None,
            cache_control: None,
            body_excerpt: String::new(),
            body_compressed: false,
            headers: Vec::new(),
            classification: UNKNOWN_LABEL.to_string(),
            elapsed_seconds: 0.0,
            fetch_error: None,
        }
    }

    /// Header snapshot rendered as a JSON object, or an empty string when there is none.
    pub fn headers_json(&self) -> String {
        if self.headers.is_empty() {
            return String::new();
        }
        let map: serde_json::Map<String, serde_json::Value> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::Value::Object(map).to_string()
    }
}

/// The merged, durable result for one host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub host: HostTarget,
    pub encrypted: ProbeOutcome,
    pub plain: ProbeOutcome,
    pub chosen_title: String,
    pub chosen_screenshot: Option<PathBuf>,
    pub chosen_classification: String,
    pub response_time_seconds: f64,
}

impl ScanRecord {
    pub fn encrypted_loaded(&self) -> bool {
        self.encrypted.loaded
    }

    pub fn plain_loaded(&self) -> bool {
        self.plain.loaded
    }

    pub fn outcome(&self, protocol: Protocol) -> &ProbeOutcome {
        match protocol {
            Protocol::Encrypted => &self.encrypted,
            Protocol::Plain => &self.plain,
        }
    }
}

/// Aggregate counters for one orchestrator run.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Unique hosts after deduplication.
    pub unique_hosts: u64,
    /// Hosts skipped because the progress store already had them.
    pub skipped: u64,
    /// Hosts scheduled in this run.
    pub scheduled: u64,
    /// Hosts whose record reached every output and the progress store.
    pub completed: u64,
    /// Hosts whose record could not be persisted everywhere.
    pub failed: u64,
    pub interrupted: bool,
    pub elapsed_seconds: f64,
}

impl RunSummary {
    pub fn remaining(&self) -> u64 {
        self.scheduled.saturating_sub(self.completed + self.failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_urls() {
        assert_eq!(Protocol::Plain.url_for("10.0.0.1"), "http://10.0.0.1");
        assert_eq!(Protocol::Encrypted.url_for("bms.local"), "https://bms.local");
    }

    #[test]
    fn headers_json_empty_when_no_headers() {
        let mut o = ProbeOutcome::unreachable(Protocol::Plain);
        assert_eq!(o.headers_json(), "");
        o.headers.push(("server".into(), "Niagara Web Server".into()));
        assert_eq!(o.headers_json(), r#"{"server":"Niagara Web Server"}"#);
    }

    #[test]
    fn remaining_counts_unfinished_hosts() {
        let s = RunSummary { scheduled: 10, completed: 6, failed: 1, ..Default::default() };
        assert_eq!(s.remaining(), 3);
    }
}
