//! Crash-safe file replacement and corrupt-file quarantine.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use time::OffsetDateTime;

pub fn unix_secs() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Write `bytes` to a temporary file next to `path`, sync it and rename it over
/// `path`. Readers only ever see the old or the new contents.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Move an unreadable file aside as `<name>.bak_<unix secs>` and return the new path.
pub fn quarantine(path: &Path) -> Result<PathBuf> {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".bak_{}", unix_secs()));
    let backup = PathBuf::from(name);
    fs::rename(path, &backup)
        .with_context(|| format!("failed to move {} aside", path.display()))?;
    tracing::error!(
        file = %path.display(),
        backup = %backup.display(),
        "output file was corrupt; moved aside and starting fresh"
    );
    Ok(backup)
}

/// True when the file is absent or has no bytes.
pub fn missing_or_empty(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn replaces_contents_whole() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        // No temp files left behind.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn quarantine_moves_file_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.xml");
        fs::write(&path, "garbage").unwrap();
        let backup = quarantine(&path).unwrap();
        assert!(!path.exists());
        assert!(backup.to_string_lossy().contains("results.xml.bak_"));
        assert_eq!(fs::read_to_string(backup).unwrap(), "garbage");
    }

    #[test]
    fn empty_counts_as_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.csv");
        assert!(missing_or_empty(&path));
        fs::write(&path, "").unwrap();
        assert!(missing_or_empty(&path));
        fs::write(&path, "x").unwrap();
        assert!(!missing_or_empty(&path));
    }
}
