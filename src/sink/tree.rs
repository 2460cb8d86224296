//! XML output: a `<Results>` root with one `<Entry>` per host, rewritten
//! atomically on every append.

use anyhow::{bail, Context, Result};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::atomic::{quarantine, write_atomic};
use super::columns::{format_seconds, path_text, works};
use super::{now_rfc3339, RecordWriter};
use crate::types::{ProbeOutcome, ScanRecord};

const ROOT: &str = "Results";

pub struct TreeWriter {
    path: PathBuf,
}

impl TreeWriter {
    /// Create the document if absent; move it aside if it does not parse.
    pub fn open(path: &Path) -> Result<Self> {
        let writer = Self {
            path: path.to_path_buf(),
        };
        match writer.load()? {
            Some(doc) if rewrite(&doc, None).is_ok() => {
                tracing::info!(file = %path.display(), "using existing XML output");
            }
            Some(_) => {
                quarantine(path)?;
                writer.create()?;
            }
            None => writer.create()?,
        }
        Ok(writer)
    }

    fn create(&self) -> Result<()> {
        write_atomic(&self.path, &fresh_document()?)
            .with_context(|| format!("failed to create {}", self.path.display()))?;
        tracing::info!(file = %self.path.display(), "created XML output");
        Ok(())
    }

    /// `None` when the file does not exist; unreadable bytes come back as an empty document.
    fn load(&self) -> Result<Option<String>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(String::from_utf8(bytes).unwrap_or_default())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", self.path.display())),
        }
    }
}

impl RecordWriter for TreeWriter {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn append(&mut self, record: &ScanRecord) -> Result<()> {
        let updated = match self.load()? {
            None => rewrite(&String::from_utf8_lossy(&fresh_document()?), Some(record))?,
            Some(doc) => match rewrite(&doc, Some(record)) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(file = %self.path.display(), "XML output unreadable: {e:#}");
                    quarantine(&self.path)?;
                    rewrite(&String::from_utf8_lossy(&fresh_document()?), Some(record))?
                }
            },
        };
        write_atomic(&self.path, &updated)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

fn fresh_document() -> Result<Vec<u8>> {
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    let generated = now_rfc3339();
    let mut root = BytesStart::new(ROOT);
    root.push_attribute(("generated", generated.as_str()));
    w.write_event(Event::Start(root))?;
    w.write_event(Event::End(BytesEnd::new(ROOT)))?;
    Ok(w.into_inner())
}

/// Re-emit `doc`, inserting `record` as the last child of the root. With `None`
/// this only validates. Fails if the document is malformed or the root is not `<Results>`.
fn rewrite(doc: &str, record: Option<&ScanRecord>) -> Result<Vec<u8>> {
    let mut reader = Reader::from_str(doc);
    reader.config_mut().trim_text(true);
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    let mut depth = 0usize;
    let mut closed_root = false;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => {
                if depth == 0 {
                    check_root(&e, closed_root)?;
                }
                depth += 1;
                w.write_event(Event::Start(e))?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some(rec) = record {
                        write_entry(&mut w, rec)?;
                    }
                    closed_root = true;
                }
                w.write_event(Event::End(e))?;
            }
            Event::Empty(e) if depth == 0 => {
                check_root(&e, closed_root)?;
                w.write_event(Event::Start(e))?;
                if let Some(rec) = record {
                    write_entry(&mut w, rec)?;
                }
                w.write_event(Event::End(BytesEnd::new(ROOT)))?;
                closed_root = true;
            }
            other => w.write_event(other)?,
        }
    }
    if !closed_root {
        bail!("document has no complete <{ROOT}> element");
    }
    Ok(w.into_inner())
}

fn check_root(e: &BytesStart<'_>, closed_root: bool) -> Result<()> {
    if closed_root {
        bail!("more than one root element");
    }
    if e.name().as_ref() != ROOT.as_bytes() {
        bail!(
            "unexpected root element <{}>",
            String::from_utf8_lossy(e.name().as_ref())
        );
    }
    Ok(())
}

fn write_entry<W: Write>(w: &mut Writer<W>, rec: &ScanRecord) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new("Entry")))?;
    text_element(w, "IP_Host", &rec.host)?;
    text_element(w, "HTTPS_Works", &works(rec.encrypted.loaded))?;
    text_element(w, "HTTP_Works", &works(rec.plain.loaded))?;
    text_element(w, "Chosen_Title", &rec.chosen_title)?;
    text_element(w, "BMS_Type", &rec.chosen_classification)?;
    text_element(w, "Response_Time_s", &format_seconds(rec.response_time_seconds))?;
    if let Some(shot) = &rec.chosen_screenshot {
        text_element(w, "Screenshot_Path", &path_text(shot))?;
    }
    protocol_info(w, "HTTPS_Info", &rec.encrypted)?;
    protocol_info(w, "HTTP_Info", &rec.plain)?;
    w.write_event(Event::End(BytesEnd::new("Entry")))?;
    Ok(())
}

fn protocol_info<W: Write>(w: &mut Writer<W>, name: &str, o: &ProbeOutcome) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    text_element(w, "Title", &o.title)?;
    if let Some(code) = o.status_code {
        text_element(w, "Status_Code", &code.to_string())?;
    }
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    text_element(w, "Content_Length", &opt(&o.content_length))?;
    text_element(w, "Content_Type", &opt(&o.content_type))?;
    text_element(w, "Cache_Control", &opt(&o.cache_control))?;
    let headers = o.headers_json();
    if !headers.is_empty() {
        if headers.contains("]]>") {
            text_element(w, "Remote_Headers", &headers)?;
        } else {
            w.create_element("Remote_Headers")
                .write_cdata_content(BytesCData::new(headers.as_str()))?;
        }
    }
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Empty values are omitted.
fn text_element<W: Write>(w: &mut Writer<W>, name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    w.create_element(name)
        .write_text_content(BytesText::new(value))?;
    Ok(())
}
