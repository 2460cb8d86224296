//! JSON output: `{"generated": ..., "results": [...]}`, rewritten atomically on every append.

use anyhow::{bail, Context, Result};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use super::atomic::{quarantine, write_atomic};
use super::{now_rfc3339, RecordWriter};
use crate::config::{ContentConfig, JsonVerbosity};
use crate::types::{ProbeOutcome, ScanRecord};

pub struct DocumentWriter {
    path: PathBuf,
    content: ContentConfig,
    screenshots_enabled: bool,
}

impl DocumentWriter {
    pub fn open(path: &Path, content: &ContentConfig, screenshots_enabled: bool) -> Result<Self> {
        let writer = Self {
            path: path.to_path_buf(),
            content: content.clone(),
            screenshots_enabled,
        };
        match writer.load()? {
            Some(Ok(_)) => tracing::info!(file = %path.display(), "using existing JSON output"),
            Some(Err(e)) => {
                tracing::error!(file = %path.display(), "JSON output unreadable: {e:#}");
                quarantine(path)?;
                writer.save(&fresh_document())?;
            }
            None => {
                writer.save(&fresh_document())?;
                tracing::info!(file = %path.display(), "created JSON output");
            }
        }
        Ok(writer)
    }

    /// Outer `None` when the file does not exist; inner `Err` when it does not parse.
    fn load(&self) -> Result<Option<Result<Value>>> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        Ok(Some(parse_document(&bytes)))
    }

    fn save(&self, doc: &Value) -> Result<()> {
        let bytes = if self.content.minify_json {
            serde_json::to_vec(doc)?
        } else {
            serde_json::to_vec_pretty(doc)?
        };
        write_atomic(&self.path, &bytes)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    pub fn entry(&self, rec: &ScanRecord) -> Value {
        let mut entry = Map::new();
        entry.insert("ip_host".into(), json!(rec.host));
        entry.insert("https_works".into(), json!(rec.encrypted.loaded));
        entry.insert("http_works".into(), json!(rec.plain.loaded));
        entry.insert("chosen_title".into(), json!(rec.chosen_title));
        entry.insert("bms_type".into(), json!(rec.chosen_classification));
        entry.insert(
            "response_time_s".into(),
            json!((rec.response_time_seconds * 100.0).round() / 100.0),
        );
        if self.screenshots_enabled {
            if let Some(shot) = &rec.chosen_screenshot {
                entry.insert("screenshot_path".into(), json!(shot.to_string_lossy()));
            }
        }
        entry.insert("https".into(), self.protocol_entry(&rec.encrypted));
        entry.insert("http".into(), self.protocol_entry(&rec.plain));
        drop_empty(&mut entry);
        Value::Object(entry)
    }

    fn protocol_entry(&self, o: &ProbeOutcome) -> Value {
        let mut m = Map::new();
        m.insert("title".into(), json!(o.title));
        m.insert("status_code".into(), json!(o.status_code));
        if self.content.json_verbosity == JsonVerbosity::Full {
            m.insert("content_length".into(), json!(o.content_length));
            m.insert("content_type".into(), json!(o.content_type));
            m.insert("cache_control".into(), json!(o.cache_control));
            let headers: Map<String, Value> = o
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), json!(v)))
                .collect();
            m.insert("headers".into(), Value::Object(headers));
            if !o.body_excerpt.is_empty() {
                m.insert("body".into(), json!(o.body_excerpt));
                m.insert("body_compressed".into(), json!(o.body_compressed));
            }
        }
        drop_empty(&mut m);
        Value::Object(m)
    }
}

impl RecordWriter for DocumentWriter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn append(&mut self, record: &ScanRecord) -> Result<()> {
        let mut doc = match self.load()? {
            Some(Ok(doc)) => doc,
            Some(Err(e)) => {
                tracing::error!(file = %self.path.display(), "JSON output unreadable: {e:#}");
                quarantine(&self.path)?;
                fresh_document()
            }
            None => fresh_document(),
        };
        match doc.get_mut("results").and_then(Value::as_array_mut) {
            Some(results) => results.push(self.entry(record)),
            None => bail!("{} lost its results array", self.path.display()),
        }
        self.save(&doc)
    }
}

fn fresh_document() -> Value {
    json!({ "generated": now_rfc3339(), "results": [] })
}

fn parse_document(bytes: &[u8]) -> Result<Value> {
    let doc: Value = serde_json::from_slice(bytes).context("invalid JSON")?;
    if !doc.get("results").is_some_and(Value::is_array) {
        bail!("missing results array");
    }
    Ok(doc)
}

/// Remove nulls, empty strings and empty objects.
fn drop_empty(map: &mut Map<String, Value>) {
    map.retain(|_, v| match v {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeaderLevel;
    use crate::merge::merge;
    use crate::types::Protocol;
    use tempfile::TempDir;

    fn content(verbosity: JsonVerbosity, minify: bool) -> ContentConfig {
        ContentConfig {
            max_body_bytes: 5000,
            header_level: HeaderLevel::Essential,
            compression: false,
            json_verbosity: verbosity,
            minify_json: minify,
        }
    }

    fn record(host: &str) -> ScanRecord {
        let mut plain = ProbeOutcome::unreachable(Protocol::Plain);
        plain.loaded = true;
        plain.title = "WebCTRL".into();
        plain.status_code = Some(200);
        plain.content_type = Some("text/html".into());
        plain.body_excerpt = "<html/>".into();
        plain.classification = "Automated Logic".into();
        merge(host, plain, ProbeOutcome::unreachable(Protocol::Encrypted))
    }

    #[test]
    fn full_entry_keeps_metadata_and_drops_empties() {
        let dir = TempDir::new().unwrap();
        let w = DocumentWriter::open(&dir.path().join("r.json"), &content(JsonVerbosity::Full, false), true)
            .unwrap();
        let e = w.entry(&record("h"));
        assert_eq!(e["http"]["content_type"], "text/html");
        assert_eq!(e["http"]["body"], "<html/>");
        assert_eq!(e["http"]["body_compressed"], false);
        assert_eq!(e["https_works"], false);
        assert!(e["https"].get("title").is_none());
        assert!(e.get("screenshot_path").is_none());
    }

    #[test]
    fn minimal_entry_has_title_and_status_only() {
        let dir = TempDir::new().unwrap();
        let w = DocumentWriter::open(&dir.path().join("r.json"), &content(JsonVerbosity::Minimal, true), true)
            .unwrap();
        let e = w.entry(&record("h"));
        let keys: Vec<_> = e["http"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["status_code".to_string(), "title".to_string()]);
    }

    #[test]
    fn appends_and_minifies() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.json");
        let mut w = DocumentWriter::open(&path, &content(JsonVerbosity::Full, true), false).unwrap();
        w.append(&record("a")).unwrap();
        w.append(&record("b")).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains('\n'));
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["results"].as_array().unwrap().len(), 2);
        assert_eq!(doc["results"][1]["ip_host"], "b");
    }

    #[test]
    fn wrong_shape_is_corrupt() {
        assert!(parse_document(br#"{"results": {}}"#).is_err());
        assert!(parse_document(b"[1,2]").is_err());
        assert!(parse_document(br#"{"generated":"x","results":[]}"#).is_ok());
    }
}
