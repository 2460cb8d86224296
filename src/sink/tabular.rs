//! Excel workbook output with embedded or linked screenshots.
//!
//! The workbook is rebuilt in full and atomically replaced on every append.
//! Rows already on disk are read back once when the sink opens.
//!
//! Cost grows with the row count: each append re-serialises every row and
//! re-embeds every screenshot, so a run of n hosts writes O(n²) bytes. Use
//! `--screenshots-external` or disable this output for very large host lists.

use anyhow::{Context, Result};
use calamine::{open_workbook, Data, Reader, Xlsx};
use rust_xlsxwriter::{Color, Format, FormatAlign, Image, Url, Workbook, Worksheet};
use std::path::{Path, PathBuf};

use super::atomic::{quarantine, unix_secs, write_atomic};
use super::columns::{self, Column, COLUMNS, SCREENSHOT_COLUMN};
use super::RecordWriter;
use crate::config::ScreenshotConfig;
use crate::types::ScanRecord;

const SHEET_NAME: &str = "Results";
const HEADER_FILL: u32 = 0x4472C4;
const STRIPE_FILL: u32 = 0xE6F0FF;
const IMAGE_BOX: (f64, f64) = (500.0, 375.0);
const MIN_IMAGE_ROW_HEIGHT: f64 = 250.0;

pub const NO_SCREENSHOT: &str = "(No screenshot)";
pub const SCREENSHOTS_DISABLED: &str = "N/A";
pub const SCREENSHOT_MISSING: &str = "(Screenshot file not found)";

pub struct TabularWriter {
    path: PathBuf,
    screenshots: ScreenshotConfig,
    rows: Vec<Vec<String>>,
}

impl TabularWriter {
    pub fn open(path: &Path, screenshots: &ScreenshotConfig) -> Result<Self> {
        let mut writer = Self {
            path: path.to_path_buf(),
            screenshots: screenshots.clone(),
            rows: Vec::new(),
        };
        if path.exists() {
            match read_rows(path) {
                Ok(rows) => {
                    tracing::info!(file = %path.display(), rows = rows.len(), "loaded existing workbook");
                    writer.rows = rows;
                }
                Err(e) => {
                    tracing::error!(file = %path.display(), "workbook unreadable: {e:#}");
                    quarantine(path)?;
                    writer.save()?;
                }
            }
        } else {
            writer.save()?;
            tracing::info!(file = %path.display(), "created workbook");
        }
        Ok(writer)
    }

    /// Cell text for the screenshot column of a new row.
    fn screenshot_cell(&self, record: &ScanRecord) -> String {
        if !self.screenshots.enabled {
            return SCREENSHOTS_DISABLED.to_string();
        }
        let Some(shot) = &record.chosen_screenshot else {
            return NO_SCREENSHOT.to_string();
        };
        if !shot.exists() {
            return SCREENSHOT_MISSING.to_string();
        }
        columns::path_text(&self.relative(shot))
    }

    fn relative(&self, shot: &Path) -> PathBuf {
        let base = self.path.parent().unwrap_or(Path::new(""));
        shot.strip_prefix(base)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| shot.to_path_buf())
    }

    fn resolve(&self, cell: &str) -> Option<PathBuf> {
        if cell.is_empty() || cell.starts_with('(') || cell == SCREENSHOTS_DISABLED {
            return None;
        }
        let p = Path::new(cell);
        let full = if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.path.parent().unwrap_or(Path::new("")).join(p)
        };
        full.exists().then_some(full)
    }

    fn build(&self) -> Result<Workbook> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;

        let header = Format::new()
            .set_bold()
            .set_font_color(Color::White)
            .set_background_color(Color::RGB(HEADER_FILL))
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_text_wrap();
        for (col, column) in COLUMNS.iter().enumerate() {
            let col = col as u16;
            sheet.write_string_with_format(0, col, column.header(), &header)?;
            sheet.set_column_width(col, column_width(*column))?;
        }

        let plain = Format::new().set_text_wrap().set_align(FormatAlign::Top);
        let striped = plain.clone().set_background_color(Color::RGB(STRIPE_FILL));

        for (i, values) in self.rows.iter().enumerate() {
            let row = i as u32 + 1;
            // Excel row numbers are 1-based; even ones get the stripe.
            let format = if (row + 1) % 2 == 0 { &striped } else { &plain };
            for (col, value) in values.iter().enumerate() {
                let col = col as u16;
                if col == SCREENSHOT_COLUMN {
                    self.write_screenshot(sheet, row, value, format)?;
                } else {
                    sheet.write_string_with_format(row, col, value, format)?;
                }
            }
        }
        Ok(workbook)
    }

    fn write_screenshot(
        &self,
        sheet: &mut Worksheet,
        row: u32,
        cell: &str,
        format: &Format,
    ) -> Result<()> {
        let Some(file) = self.resolve(cell) else {
            sheet.write_string_with_format(row, SCREENSHOT_COLUMN, cell, format)?;
            return Ok(());
        };
        if self.screenshots.external {
            let link = Url::new(file_link(cell)).set_text(cell);
            if let Err(e) = sheet.write_url_with_format(row, SCREENSHOT_COLUMN, link, format) {
                tracing::warn!(file = %file.display(), "failed to link screenshot: {e}");
                sheet.write_string_with_format(row, SCREENSHOT_COLUMN, cell, format)?;
            }
            return Ok(());
        }
        sheet.write_string_with_format(row, SCREENSHOT_COLUMN, cell, format)?;
        match embedded_image(&file) {
            Ok((image, height)) => {
                sheet.insert_image(row, SCREENSHOT_COLUMN, &image)?;
                sheet.set_row_height(row, (height * 0.75).max(MIN_IMAGE_ROW_HEIGHT))?;
            }
            Err(e) => {
                let name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                tracing::warn!(file = %file.display(), "failed to embed screenshot: {e:#}");
                sheet.write_string_with_format(
                    row,
                    SCREENSHOT_COLUMN,
                    &format!("Error embedding: {name}"),
                    format,
                )?;
            }
        }
        Ok(())
    }

    /// Write the workbook. A locked target gets a timestamped sibling instead.
    fn save(&self) -> Result<()> {
        self.save_with(write_atomic).map(|_| ())
    }

    /// Returns the path actually written.
    fn save_with<F>(&self, write: F) -> Result<PathBuf>
    where
        F: Fn(&Path, &[u8]) -> std::io::Result<()>,
    {
        let bytes = self.build()?.save_to_buffer()?;
        match write(&self.path, &bytes) {
            Ok(()) => Ok(self.path.clone()),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                let backup = backup_path(&self.path);
                tracing::error!(
                    file = %self.path.display(),
                    backup = %backup.display(),
                    "workbook is locked by another program; writing a backup copy"
                );
                write(&backup, &bytes)
                    .with_context(|| format!("failed to write {}", backup.display()))?;
                Ok(backup)
            }
            Err(e) => Err(e).with_context(|| format!("failed to write {}", self.path.display())),
        }
    }
}

impl RecordWriter for TabularWriter {
    fn name(&self) -> &'static str {
        "excel"
    }

    fn append(&mut self, record: &ScanRecord) -> Result<()> {
        let mut values = columns::row(record);
        values[SCREENSHOT_COLUMN as usize] = self.screenshot_cell(record);
        self.rows.push(values);
        if let Err(e) = self.save() {
            self.rows.pop();
            return Err(e);
        }
        Ok(())
    }
}

fn column_width(column: Column) -> f64 {
    match column {
        Column::Screenshot => 60.0,
        Column::Host | Column::ChosenTitle | Column::Classification => 25.0,
        Column::RemoteHeaders(_) => 30.0,
        _ => 15.0,
    }
}

/// The image scaled into the bounding box, and its displayed height in pixels.
fn embedded_image(file: &Path) -> Result<(Image, f64)> {
    let image = Image::new(file)?;
    let (w, h) = (image.width(), image.height());
    if w <= 0.0 || h <= 0.0 {
        anyhow::bail!("image has no dimensions");
    }
    let scale = (IMAGE_BOX.0 / w).min(IMAGE_BOX.1 / h);
    let image = image.set_scale_width(scale).set_scale_height(scale);
    Ok((image, h * scale))
}

/// `file:///` link for a screenshot cell, which holds either a path relative
/// to the workbook or an absolute one.
fn file_link(cell: &str) -> String {
    let target = cell.replace('\\', "/");
    match target.strip_prefix('/') {
        Some(rest) => format!("file:///{rest}"),
        None => format!("file:///{target}"),
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_string());
    path.with_file_name(format!("{stem}_backup_{}.xlsx", unix_secs()))
}

/// Data rows (header skipped) of the first worksheet, as text.
fn read_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .context("workbook has no worksheets")??;
    let rows = range
        .rows()
        .skip(1)
        .map(|cells| {
            let mut values: Vec<String> = cells.iter().map(cell_text).collect();
            values.resize(COLUMNS.len(), String::new());
            values
        })
        .filter(|values| values.iter().any(|v| !v.is_empty()))
        .collect();
    Ok(rows)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScreenshotFormat;
    use crate::merge::merge;
    use crate::types::{ProbeOutcome, Protocol};
    use tempfile::TempDir;

    fn shots(dir: &Path, enabled: bool) -> ScreenshotConfig {
        ScreenshotConfig {
            enabled,
            format: ScreenshotFormat::Png,
            quality: 50,
            max_dimension: 0,
            external: false,
            retention_days: 0,
            dir: dir.join("screenshots"),
        }
    }

    fn record(host: &str) -> ScanRecord {
        let mut plain = ProbeOutcome::unreachable(Protocol::Plain);
        plain.loaded = true;
        plain.title = "Tracer SC".into();
        plain.classification = "Trane".into();
        merge(host, plain, ProbeOutcome::unreachable(Protocol::Encrypted))
    }

    #[test]
    fn rows_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.xlsx");
        let mut w = TabularWriter::open(&path, &shots(dir.path(), true)).unwrap();
        w.append(&record("10.0.0.1")).unwrap();

        let mut w = TabularWriter::open(&path, &shots(dir.path(), true)).unwrap();
        assert_eq!(w.rows.len(), 1);
        w.append(&record("10.0.0.2")).unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "10.0.0.1");
        assert_eq!(rows[1][4], "Trane");
        assert_eq!(rows[1][6], NO_SCREENSHOT);
    }

    #[test]
    fn disabled_screenshots_are_marked() {
        let dir = TempDir::new().unwrap();
        let w = TabularWriter::open(&dir.path().join("r.xlsx"), &shots(dir.path(), false)).unwrap();
        assert_eq!(w.screenshot_cell(&record("h")), SCREENSHOTS_DISABLED);
    }

    #[test]
    fn missing_screenshot_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let w = TabularWriter::open(&dir.path().join("r.xlsx"), &shots(dir.path(), true)).unwrap();
        let mut rec = record("h");
        rec.chosen_screenshot = Some(dir.path().join("screenshots/gone.png"));
        assert_eq!(w.screenshot_cell(&rec), SCREENSHOT_MISSING);
    }

    #[test]
    fn unreadable_workbook_is_moved_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.xlsx");
        std::fs::write(&path, b"not a zip").unwrap();
        let w = TabularWriter::open(&path, &shots(dir.path(), true)).unwrap();
        assert!(w.rows.is_empty());
        let backups = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .contains(".bak_")
            })
            .count();
        assert_eq!(backups, 1);
    }

    fn with_screenshot(dir: &Path, host: &str) -> ScanRecord {
        let shots_dir = dir.join("screenshots");
        std::fs::create_dir_all(&shots_dir).unwrap();
        let file = shots_dir.join(format!("https_{host}_1.png"));
        std::fs::write(&file, b"png bytes").unwrap();
        let mut rec = record(host);
        rec.chosen_screenshot = Some(file);
        rec
    }

    #[test]
    fn external_mode_links_relative_screenshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.xlsx");
        let mut cfg = shots(dir.path(), true);
        cfg.external = true;
        let mut w = TabularWriter::open(&path, &cfg).unwrap();

        w.append(&with_screenshot(dir.path(), "h")).unwrap();
        w.append(&record("10.0.0.2")).unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][SCREENSHOT_COLUMN as usize], "screenshots/https_h_1.png");
        assert_eq!(rows[1][SCREENSHOT_COLUMN as usize], NO_SCREENSHOT);
    }

    #[test]
    fn file_links_carry_scheme() {
        assert_eq!(file_link("screenshots/a.png"), "file:///screenshots/a.png");
        assert_eq!(file_link("/out/shots/a.png"), "file:///out/shots/a.png");
        assert_eq!(file_link(r"shots\a.png"), "file:///shots/a.png");
    }

    #[test]
    fn locked_workbook_falls_back_to_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.xlsx");
        let mut w = TabularWriter::open(&path, &shots(dir.path(), true)).unwrap();
        w.rows.push(columns::row(&record("10.0.0.1")));

        let locked = |target: &Path, bytes: &[u8]| -> std::io::Result<()> {
            if target == path.as_path() {
                Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
            } else {
                write_atomic(target, bytes)
            }
        };
        let written = w.save_with(locked).unwrap();

        assert_ne!(written, path);
        let name = written.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("results_backup_"));
        let rows = read_rows(&written).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "10.0.0.1");
        // The original still holds the state before the failed save.
        assert!(read_rows(&path).unwrap().is_empty());
    }

    #[test]
    fn other_write_errors_are_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.xlsx");
        let w = TabularWriter::open(&path, &shots(dir.path(), true)).unwrap();
        let broken = |_: &Path, _: &[u8]| -> std::io::Result<()> {
            Err(std::io::Error::other("disk full"))
        };
        assert!(w.save_with(broken).is_err());
    }

    #[test]
    fn backup_name_keeps_stem() {
        let p = backup_path(Path::new("/out/results.xlsx"));
        let name = p.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("results_backup_") && name.ends_with(".xlsx"));
    }
}
