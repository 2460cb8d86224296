//! Durable, multi-format result output.
//!
//! Each enabled representation sits behind its own lock, so workers writing
//! different formats never wait on each other.

pub mod atomic;
pub mod columns;
pub mod document;
pub mod flat;
pub mod tabular;
pub mod tree;

use anyhow::Result;
use std::sync::{Mutex, PoisonError};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::types::ScanRecord;

/// One output representation.
pub trait RecordWriter: Send {
    fn name(&self) -> &'static str;
    /// Persist `record`. When this returns `Ok` the file is complete on disk.
    fn append(&mut self, record: &ScanRecord) -> Result<()>;
}

pub struct ResultSink {
    writers: Vec<Mutex<Box<dyn RecordWriter>>>,
}

impl ResultSink {
    /// Open every enabled output, creating or repairing files as needed.
    pub fn open(cfg: &ScanConfig) -> Result<Self> {
        std::fs::create_dir_all(&cfg.output.dir)?;
        let mut writers: Vec<Box<dyn RecordWriter>> = Vec::new();
        if let Some(path) = &cfg.output.excel {
            writers.push(Box::new(tabular::TabularWriter::open(path, &cfg.screenshots)?));
        }
        if let Some(path) = &cfg.output.xml {
            writers.push(Box::new(tree::TreeWriter::open(path)?));
        }
        if let Some(path) = &cfg.output.csv {
            writers.push(Box::new(flat::FlatWriter::open(path)?));
        }
        if let Some(path) = &cfg.output.json {
            writers.push(Box::new(document::DocumentWriter::open(
                path,
                &cfg.content,
                cfg.screenshots.enabled,
            )?));
        }
        Ok(Self::from_writers(writers))
    }

    pub fn from_writers(writers: Vec<Box<dyn RecordWriter>>) -> Self {
        Self {
            writers: writers.into_iter().map(Mutex::new).collect(),
        }
    }

    pub fn formats(&self) -> Vec<&'static str> {
        self.writers
            .iter()
            .map(|w| w.lock().unwrap_or_else(PoisonError::into_inner).name())
            .collect()
    }

    /// Write `record` to every enabled output. Every output is attempted even
    /// if an earlier one fails; any failure is reported as one error.
    pub fn append(&self, record: &ScanRecord) -> Result<(), ScanError> {
        let mut failures = Vec::new();
        for writer in &self.writers {
            let mut w = writer.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = w.append(record) {
                tracing::error!(host = %record.host, format = w.name(), "failed to write result: {e:#}");
                failures.push(format!("{}: {e:#}", w.name()));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ScanError::Sink {
                host: record.host.clone(),
                details: failures.join("; "),
            })
        }
    }
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
