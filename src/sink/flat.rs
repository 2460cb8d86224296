//! Append-only CSV output.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use super::atomic::missing_or_empty;
use super::columns;
use super::RecordWriter;
use crate::types::ScanRecord;

pub struct FlatWriter {
    path: PathBuf,
}

impl FlatWriter {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let writer = Self {
            path: path.to_path_buf(),
        };
        writer.ensure_header()?;
        Ok(writer)
    }

    fn ensure_header(&self) -> Result<()> {
        if !missing_or_empty(&self.path) {
            return Ok(());
        }
        let mut w = csv::Writer::from_path(&self.path)
            .with_context(|| format!("failed to create {}", self.path.display()))?;
        w.write_record(columns::header_row())?;
        w.flush()?;
        tracing::info!(file = %self.path.display(), "created CSV output");
        Ok(())
    }
}

impl RecordWriter for FlatWriter {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn append(&mut self, record: &ScanRecord) -> Result<()> {
        self.ensure_header()?;
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        let mut w = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        w.write_record(columns::row(record))?;
        let file = w
            .into_inner()
            .map_err(|e| anyhow::anyhow!("failed to flush {}: {}", self.path.display(), e.error()))?;
        file.sync_data()?;
        Ok(())
    }
}
